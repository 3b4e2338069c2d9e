// Showrunner LLM - Multi-provider abstraction and function routing
//
// The provider trait is the engine's only boundary to the outside world:
// one generate operation with classified failures. The router above it
// owns provider selection, the content-block fallback policy, and the
// per-function statistics table.

pub mod provider;
pub mod providers;
pub mod router;

pub use provider::{GenerateRequest, Generation, Provider};
pub use providers::{
    create_provider, AnthropicProvider, GoogleProvider, OpenAiProvider, XaiProvider,
};
pub use router::{FunctionRouter, RoutingStats};
