pub use wrapped::WrappedArcMutex;

pub type Map<K, V> = hashbrown::HashMap<K, V>;
pub type Set<T> = hashbrown::HashSet<T>;

pub mod error;
pub mod id_counter;
#[macro_use]
pub mod macros;
mod wrapped;
