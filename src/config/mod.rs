mod settings;

pub use settings::{
    CacheConfig, ConversationConfig, ExecutorConfig, LLMConfig, LoggingConfig, Settings,
    SynthesisConfig, ToolsConfig, Transport,
};
