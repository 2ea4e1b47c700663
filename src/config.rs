//! Configuration Functions
//!
//! The layer engine can be configured at runtime using environment variables or
//! by using functions in this module. Options set by calling functions in this
//! module override options set in environment variables, and thread local
//! options override global ones.
//!
//! ```
//! use ogr_layer::config::*;
//!
//! // Snap geometries to the declared coordinate precision on write
//! set_config_option("OGR_APPLY_GEOM_SET_PRECISION", "YES").unwrap();
//!
//! assert_eq!(get_config_option("OGR_APPLY_GEOM_SET_PRECISION", "").unwrap(), "YES");
//!
//! clear_config_option("OGR_APPLY_GEOM_SET_PRECISION").unwrap();
//!
//! assert_eq!(get_config_option("OGR_APPLY_GEOM_SET_PRECISION", "NO").unwrap(), "NO");
//! ```
//!
//! Recognized options:
//!
//! * `OGR_APPLY_GEOM_SET_PRECISION`: when true, geometries written to a layer whose
//!   geometry field declares an XY resolution are snapped to that grid.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::errors::{GdalError, Result};

static GLOBAL_OPTIONS: Lazy<Mutex<HashMap<String, String>>> = Lazy::new(Default::default);

thread_local! {
    static THREAD_LOCAL_OPTIONS: RefCell<HashMap<String, String>> = RefCell::new(HashMap::new());
}

fn validate(key: &str, value: Option<&str>) -> Result<()> {
    if key.is_empty() || key.contains(['\0', '=']) {
        return Err(GdalError::BadArgument(format!(
            "Invalid configuration key: '{}'",
            key.escape_debug()
        )));
    }
    if let Some(value) = value {
        if value.contains('\0') {
            return Err(GdalError::BadArgument(format!(
                "Invalid configuration value: '{}'",
                value.escape_debug()
            )));
        }
    }
    Ok(())
}

fn with_global<T>(f: impl FnOnce(&mut HashMap<String, String>) -> T) -> T {
    let mut options = match GLOBAL_OPTIONS.lock() {
        Ok(guard) => guard,
        // a panic while holding the lock cannot leave the map half-written
        Err(poison_error) => poison_error.into_inner(),
    };
    f(&mut options)
}

/// Set a configuration option
pub fn set_config_option(key: &str, value: &str) -> Result<()> {
    validate(key, Some(value))?;
    with_global(|options| options.insert(key.to_string(), value.to_string()));
    Ok(())
}

/// Get the value of a configuration option
///
/// Lookup order is thread local options, global options, then the process
/// environment. If the option specified by `key` is not found, the value
/// passed in the `default` parameter is returned.
pub fn get_config_option(key: &str, default: &str) -> Result<String> {
    validate(key, None)?;
    if let Some(value) = THREAD_LOCAL_OPTIONS.with(|options| options.borrow().get(key).cloned()) {
        return Ok(value);
    }
    if let Some(value) = with_global(|options| options.get(key).cloned()) {
        return Ok(value);
    }
    Ok(std::env::var(key).unwrap_or_else(|_| default.to_string()))
}

/// Clear the value of a configuration option
pub fn clear_config_option(key: &str) -> Result<()> {
    validate(key, None)?;
    with_global(|options| options.remove(key));
    Ok(())
}

/// Set a configuration option with **thread local** scope
pub fn set_thread_local_config_option(key: &str, value: &str) -> Result<()> {
    validate(key, Some(value))?;
    THREAD_LOCAL_OPTIONS.with(|options| {
        options
            .borrow_mut()
            .insert(key.to_string(), value.to_string())
    });
    Ok(())
}

/// Get the value of a configuration option with **thread local** scope
///
/// If the option specified by `key` is not found, the value passed in the
/// `default` parameter is returned.
pub fn get_thread_local_config_option(key: &str, default: &str) -> Result<String> {
    validate(key, None)?;
    Ok(THREAD_LOCAL_OPTIONS
        .with(|options| options.borrow().get(key).cloned())
        .unwrap_or_else(|| default.to_string()))
}

/// Clear the value of a configuration option with **thread local** scope
pub fn clear_thread_local_config_option(key: &str) -> Result<()> {
    validate(key, None)?;
    THREAD_LOCAL_OPTIONS.with(|options| options.borrow_mut().remove(key));
    Ok(())
}

/// Interpret a string as a boolean.
///
/// `NO`, `FALSE`, `OFF` and `0` (in any case) are false, everything else is true.
pub fn cpl_test_bool(value: &str) -> bool {
    !(value.eq_ignore_ascii_case("NO")
        || value.eq_ignore_ascii_case("FALSE")
        || value.eq_ignore_ascii_case("OFF")
        || value == "0")
}

/// Fetch a configuration option as a boolean.
pub fn get_config_bool(key: &str, default: bool) -> Result<bool> {
    let default = if default { "YES" } else { "NO" };
    Ok(cpl_test_bool(&get_config_option(key, default)?))
}
