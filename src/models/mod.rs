pub mod date;
pub mod item;
pub mod recur;

pub use item::{BodyError, Event, EventBody, Item, Kind, Task, TaskBody, SYNCED_KINDS};
pub use recur::Recur;
