//! Agent runtime: streaming provider contract, context compaction, the
//! central turn loop, and the tool system agents call into.

pub mod autoreply;
pub mod context;
pub mod directives;
pub mod health;
pub mod prompt;
pub mod provider;
pub mod router;
pub mod stream;
pub mod thinking;
pub mod tools;
pub mod turn_loop;

pub use autoreply::{AutoReplyDispatcher, DedupeCache, DispatchOutcome, TurnDirectives};
pub use context::{CompactionStrategy, ContextManager, ContextWindow, TokenAnalyzer};
pub use directives::{ReplyDirectiveParseResult, StreamingDirectiveAccumulator};
pub use provider::{ChatRequest, ProviderError, StreamingProvider};
pub use router::{ProviderRouter, ProviderSlot};
pub use stream::ProviderEvent;
pub use turn_loop::{AgentState, AgentTurnLoop, TurnEvent};
