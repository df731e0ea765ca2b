use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use courier_core::inbound::{EventFields, InboundEvent};
use courier_core::records::{RecordKind, ResultRecord};

use crate::error::AgentError;

/// Turns one inbound event into the result record it should publish.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &'static str;
    fn kind(&self) -> RecordKind;
    async fn build_record(&self, event: &InboundEvent) -> Result<ResultRecord, AgentError>;
}

#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<String, Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn register<A>(&mut self, agent: A)
    where
        A: Agent + 'static,
    {
        self.agents.insert(agent.name().to_string(), Arc::new(agent));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

pub(crate) fn event_fields(event: &InboundEvent) -> Result<EventFields<'_>, AgentError> {
    event
        .fields()
        .ok_or_else(|| AgentError::InvalidEvent("payload.value must be a JSON object".to_string()))
}
