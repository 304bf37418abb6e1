mod graph;
mod observable;
mod sizeof;

pub use graph::{Computable, DependencyGraph};
pub use observable::{CountKind, ObservableDef, ObservableKind, ObservableList};
pub use sizeof::{SizeOf, SizeOfList};
