use crate::warehouse::{Warehouse, in_transaction};
use common::{Error, Result};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Derives the silver layer by calling one named procedure atomically.
pub struct SilverTransformer {
    warehouse: Arc<dyn Warehouse>,
    procedure: String,
}

impl SilverTransformer {
    pub fn new(warehouse: Arc<dyn Warehouse>, procedure: &str) -> Self {
        Self {
            warehouse,
            procedure: procedure.to_string(),
        }
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Commits on success; on failure everything the procedure did is rolled
    /// back and `Error::Transformation` is returned.
    pub fn run(&self) -> Result<()> {
        let started = Instant::now();
        let mut session = self.warehouse.connect()?;
        info!(procedure = %self.procedure, "Executing silver transformation");

        let result = in_transaction(session.as_mut(), |s| s.execute_procedure(&self.procedure));

        match result {
            Ok(()) => {
                info!(
                    procedure = %self.procedure,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Silver transformation committed"
                );
                Ok(())
            }
            Err(e) => {
                error!(procedure = %self.procedure, error = %e, "Silver transformation rolled back");
                Err(Error::Transformation {
                    procedure: self.procedure.clone(),
                    detail: e.to_string(),
                })
            }
        }
    }
}
