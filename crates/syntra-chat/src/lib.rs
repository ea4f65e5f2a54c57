//! SyntraBot: canned answers for the common questions, a completion API
//! for everything else.

pub mod completion;
pub mod responder;
pub mod rules;
pub mod session;

pub use completion::{CompletionBackend, CompletionMessage, OpenAiClient};
pub use responder::ChatResponder;
pub use session::{HistoryEntry, MAX_HISTORY, MemorySessionStore, Sender, SessionStore};
