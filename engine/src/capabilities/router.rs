//! Dispatch router
//!
//! Resolves a model-chosen capability name against the catalog and runs it.
//! Presentation-affine capabilities are handed to the presentation thread
//! through the action marshal; everything else runs on the calling thread.
//! Arguments are forwarded untouched.

use std::sync::Arc;

use sdk::capability::ExecutionAffinity;
use sdk::errors::EngineError;
use sdk::types::{CapabilityArgs, CapabilityOutput};
use tracing::{debug, warn};

use super::CapabilityCatalog;
use crate::marshal::ActionMarshal;

/// Routes capability calls to their implementation
#[derive(Clone)]
pub struct DispatchRouter {
    catalog: Arc<CapabilityCatalog>,
    marshal: ActionMarshal,
}

impl DispatchRouter {
    pub fn new(catalog: Arc<CapabilityCatalog>, marshal: ActionMarshal) -> Self {
        Self { catalog, marshal }
    }

    pub fn catalog(&self) -> &CapabilityCatalog {
        &self.catalog
    }

    /// Run capability `name` with `args`.
    ///
    /// An unknown name is `CapabilityNotFound`; argument and execution
    /// problems come back as whatever the capability returned.
    pub async fn dispatch(
        &self,
        name: &str,
        args: CapabilityArgs,
    ) -> Result<CapabilityOutput, EngineError> {
        let capability = self
            .catalog
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::CapabilityNotFound(name.to_string()))?;

        debug!(
            "Dispatching '{}' ({}) with {}",
            name,
            capability.affinity(),
            args.value
        );

        let result = match capability.affinity() {
            ExecutionAffinity::Presentation => {
                self.marshal.run(move || capability.invoke(args)).await
            }
            ExecutionAffinity::Worker => capability.invoke(args),
        };

        if let Err(e) = &result {
            warn!("Capability '{}' failed: {}", name, e);
        }
        result
    }

    /// Parse raw JSON argument text, then dispatch
    pub async fn dispatch_raw(
        &self,
        name: &str,
        raw_args: &str,
    ) -> Result<CapabilityOutput, EngineError> {
        if self.catalog.get(name).is_none() {
            return Err(EngineError::CapabilityNotFound(name.to_string()));
        }
        let args = CapabilityArgs::from_json_str(name, raw_args)?;
        self.dispatch(name, args).await
    }
}
