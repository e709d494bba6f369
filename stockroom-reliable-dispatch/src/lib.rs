mod errors;
pub use errors::ReliableDispatchError;

mod event_queue;
pub use event_queue::{DeadLetter, EventQueue, QueueOptions};

mod fanout;
pub use fanout::FanoutSink;
