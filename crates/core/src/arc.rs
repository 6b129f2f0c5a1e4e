use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};

/// An owning, atomically-swappable handle to a `T`. Readers call `.load()`
/// to get a cheap, short-lived snapshot; writers call `.store(Arc::new(v))`.
pub type Atomic<T> = Arc<ArcSwap<T>>;

/// Same as [`Atomic`], but the value may be absent.
pub type AtomicOption<T> = Arc<ArcSwapOption<T>>;

pub fn atomic<T>(value: T) -> Atomic<T> {
	Arc::new(ArcSwap::from_pointee(value))
}

pub fn atomic_option_empty<T>() -> AtomicOption<T> {
	Arc::new(ArcSwapOption::empty())
}
