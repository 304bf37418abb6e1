mod collect;
mod context;
mod rng;

pub use collect::{exchange, master_collect, reduce_or, reduce_sum, Window};
pub use context::Context;
pub use rng::RandomStreams;
