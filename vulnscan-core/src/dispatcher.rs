use std::sync::Arc;

use tracing::{info, warn};
use vulnscan_model::{ImageId, ImageReference, ScanId, TagPolicy};

use crate::{
    error::{Result, ScanError},
    launcher::{ExecutionUnitSpec, JobLauncher, LaunchedUnit},
    store::ScanStore,
};

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedScan {
    pub scan_id: ScanId,
    pub image_id: ImageId,
    pub unit: LaunchedUnit,
}

/// Control-plane entry point: records a PENDING scan and launches the unit
/// that will run it.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn ScanStore>,
    launcher: Arc<dyn JobLauncher>,
    tag_policy: TagPolicy,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("tag_policy", &self.tag_policy)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn ScanStore>,
        launcher: Arc<dyn JobLauncher>,
        tag_policy: TagPolicy,
    ) -> Self {
        Self {
            store,
            launcher,
            tag_policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn ScanStore> {
        &self.store
    }

    pub fn launcher(&self) -> &Arc<dyn JobLauncher> {
        &self.launcher
    }

    /// Create the image and scan rows, then launch the unit.
    ///
    /// If the launch fails the scan stays PENDING; nothing is rolled back.
    pub async fn submit_scan(&self, image_name: &str) -> Result<SubmittedScan> {
        let reference = ImageReference::resolve(image_name, self.tag_policy)?;

        let image_id = self
            .store
            .create_image(reference.name(), reference.tag())
            .await?;
        let scan_id = self.store.create_scan(image_id).await?;

        let spec = ExecutionUnitSpec::new(scan_id, reference.raw());
        let unit = self.launcher.launch(&spec).await.map_err(|source| {
            warn!(
                scan_id = %scan_id,
                image = %reference,
                error = %source,
                "execution unit launch failed; scan left PENDING"
            );
            ScanError::LaunchFailed { scan_id, source }
        })?;

        info!(
            scan_id = %scan_id,
            image = %reference,
            unit = %unit.name,
            "scan queued"
        );

        Ok(SubmittedScan {
            scan_id,
            image_id,
            unit,
        })
    }
}
