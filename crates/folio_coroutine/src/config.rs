//! Coroutine service configuration.

/// Configuration for a [`crate::CoroutineService`].
#[derive(Debug, Clone)]
pub struct CoroutineServiceConfig {
    /// Maximum number of finished execution contexts kept for reuse.
    pub max_idle_contexts: usize,

    /// Stack size of execution context threads (platform default if `None`).
    pub stack_size: Option<usize>,

    /// Name prefix for execution context threads.
    pub thread_name: String,
}

impl Default for CoroutineServiceConfig {
    fn default() -> Self {
        Self {
            max_idle_contexts: 8,
            stack_size: None,
            thread_name: "folio-coroutine".to_string(),
        }
    }
}

impl CoroutineServiceConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of idle execution contexts kept for reuse.
    #[must_use]
    pub fn max_idle_contexts(mut self, value: usize) -> Self {
        self.max_idle_contexts = value;
        self
    }

    /// Sets the stack size of execution context threads.
    #[must_use]
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Sets the thread name prefix.
    #[must_use]
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
