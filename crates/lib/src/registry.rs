//! Handler registry: channel type code -> handler.
//!
//! Built once at startup and read-only afterwards, so lookups need no locking and
//! the registry can be shared freely across request tasks.

use crate::error::{Error, Result};
use crate::handlers::{self, ChannelHandler};
use crate::msg::ChannelType;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Frozen map of channel type codes to handlers.
pub struct HandlerRegistry {
    handlers: HashMap<ChannelType, Arc<dyn ChannelHandler>>,
}

/// Collects handlers before the registry is frozen.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<ChannelType, Arc<dyn ChannelHandler>>,
}

impl RegistryBuilder {
    /// Add a handler. Registering two handlers for one code is a startup bug.
    pub fn register(mut self, handler: Arc<dyn ChannelHandler>) -> Self {
        let code = handler.channel_type();
        if let Some(old) = self.handlers.insert(code.clone(), handler) {
            panic!("channel type {} registered twice (already {})", code, old.name());
        }
        self
    }

    pub fn build(self) -> HandlerRegistry {
        log::debug!("handler registry built with {} handler(s)", self.handlers.len());
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Registry holding every built-in handler.
    pub fn with_builtin_handlers() -> Self {
        handlers::builtin()
            .into_iter()
            .fold(Self::builder(), RegistryBuilder::register)
            .build()
    }

    pub fn get(&self, code: &str) -> Result<Arc<dyn ChannelHandler>> {
        self.handlers
            .get(&ChannelType::from(code))
            .cloned()
            .ok_or_else(|| Error::UnknownChannelType(code.to_string()))
    }

    /// Registered codes, sorted.
    pub fn channel_types(&self) -> Vec<ChannelType> {
        let mut codes: Vec<ChannelType> = self.handlers.keys().cloned().collect();
        codes.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        codes
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

static GLOBAL: OnceLock<Arc<HandlerRegistry>> = OnceLock::new();

/// Process-wide registry of built-in handlers, built on first use.
pub fn global() -> Arc<HandlerRegistry> {
    GLOBAL
        .get_or_init(|| Arc::new(HandlerRegistry::with_builtin_handlers()))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{ClickSendHandler, TembaChatHandler};

    #[test]
    fn builtin_registry_resolves_codes() {
        let registry = HandlerRegistry::with_builtin_handlers();
        assert_eq!(registry.get("CS").unwrap().name(), "ClickSend");
        assert_eq!(registry.get("TWC").unwrap().name(), "Temba Chat");
        assert_eq!(
            registry.channel_types(),
            vec![ChannelType::from("CS"), ChannelType::from("TWC")]
        );
    }

    #[test]
    fn unknown_code_is_an_error() {
        let registry = HandlerRegistry::builder()
            .register(Arc::new(ClickSendHandler::new()))
            .build();
        let err = registry.get("XX").err().unwrap();
        assert!(matches!(err, Error::UnknownChannelType(ref c) if c == "XX"));
        assert!(err.is_not_found());
        assert!(registry.get("cs").is_err());
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics() {
        HandlerRegistry::builder()
            .register(Arc::new(TembaChatHandler::new()))
            .register(Arc::new(TembaChatHandler::new()));
    }

    #[test]
    fn global_registry_is_shared() {
        let a = global();
        let b = global();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 2);
    }
}
