pub mod overlay;
mod predicates;
mod set;
