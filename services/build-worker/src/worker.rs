//! Processing of one queue envelope: selection, fetch, regrid, compose,
//! encode, upload, request-row bookkeeping.

use bytes::Bytes;
use serde_json::json;
use tracing::{error, info, instrument, warn};

use metbuild::{
    encode, EncoderContext, GriddedField, Layer, Manifest, Regridder, Snap, StackComposer,
};
use metget_common::{MetGetError, MetGetResult, RequestSpec};
use selection::{DomainSelection, SelectionEngine};
use storage::{
    Catalog, Delivery, ObjectStorage, RequestStatus, Requests, StoragePath,
};

use crate::blob_cache::BlobCache;

/// What the main loop should do with the envelope.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Build finished; acknowledge.
    Completed,
    /// Terminal failure recorded on the request row; acknowledge.
    Failed,
    /// Row already terminal or claimed elsewhere; acknowledge silently.
    Duplicate,
    /// Transient failure; leave unacknowledged for redelivery.
    Retry,
}

pub struct Worker {
    pub catalog: Catalog,
    pub requests: Requests,
    pub fields: ObjectStorage,
    pub uploads: ObjectStorage,
    pub regridder: Box<dyn Regridder>,
    pub cache: BlobCache,
    pub max_tries: i32,
    pub visibility_timeout_secs: i64,
}

impl Worker {
    /// Drive one envelope through the build state machine.
    #[instrument(skip(self, delivery), fields(request_id = %delivery.envelope.request_id))]
    pub async fn process(&mut self, delivery: &Delivery) -> Outcome {
        let request_id = delivery.envelope.request_id.clone();

        // An unparseable spec can never build; it fails without a claim.
        let spec = match RequestSpec::parse(&delivery.envelope.spec_json) {
            Ok(spec) => spec,
            Err(e) => {
                error!(error = %e, "Envelope spec is invalid");
                return self.fail_terminal(&request_id, &e).await;
            }
        };

        let record = match self
            .requests
            .claim_for_run(&request_id, self.visibility_timeout_secs)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                info!("Request already terminal or claimed; dropping duplicate delivery");
                return Outcome::Duplicate;
            }
            Err(e) => {
                warn!(error = %e, "Claim failed");
                return Outcome::Retry;
            }
        };

        if record.try_count > self.max_tries {
            let err = MetGetError::Internal(format!(
                "Retry budget exhausted after {} attempts",
                record.try_count - 1
            ));
            return self.fail_terminal(&request_id, &err).await;
        }

        info!(attempt = record.try_count, "Starting build");
        self.cache.clear();

        match self.build(&request_id, &spec).await {
            Ok(()) => Outcome::Completed,
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Transient failure; leaving envelope for redelivery");
                let message = json!({ "message": format!("Transient failure: {}", e) });
                if let Err(touch_err) = self.requests.touch(&request_id, &message).await {
                    warn!(error = %touch_err, "Progress update failed");
                }
                Outcome::Retry
            }
            Err(e) => self.fail_terminal(&request_id, &e).await,
        }
    }

    async fn fail_terminal(&self, request_id: &str, err: &MetGetError) -> Outcome {
        error!(error = %err, "Build failed terminally");
        let message = json!({ "message": format!("ERROR: {}", err) });
        if let Err(e) = self
            .requests
            .set_status(request_id, RequestStatus::Error, &message)
            .await
        {
            // Without the status write the row would stay running until
            // the visibility timeout re-runs it.
            warn!(error = %e, "Failed to record terminal error");
            return Outcome::Retry;
        }
        Outcome::Failed
    }

    async fn build(&mut self, request_id: &str, spec: &RequestSpec) -> MetGetResult<()> {
        let engine = SelectionEngine::new(&self.catalog);
        let plan = engine.plan(spec).await?;
        engine.verify(spec, &plan)?;

        let mut manifest = Manifest::new(spec.json.clone());
        for domain in &plan.domains {
            manifest.add_domain_inputs(domain.domain_index, &domain.storage_keys());
        }

        let mut outputs = Vec::new();

        // Track domains pass their file through unchanged.
        for domain in &plan.domains {
            if let DomainSelection::Track { storage_key, .. } = &domain.selection {
                let data = self.fetch(storage_key).await?;
                let filename = format!("{}_{:02}.trk", spec.filename, domain.domain_index);
                outputs.push((filename, data));
            }
        }

        let gridded: Vec<_> = plan
            .stacking_order()
            .into_iter()
            .filter(|d| matches!(d.selection, DomainSelection::Fields(_)))
            .collect();

        if !gridded.is_empty() {
            let snaps = self.assemble_snaps(spec, &gridded).await?;
            let levels: Vec<u32> = gridded.iter().map(|d| d.level).collect();
            let ctx = EncoderContext {
                format: spec.format,
                variables: spec.data_type,
                filename: &spec.filename,
                start: spec.start_date,
                end: spec.end_date,
                null_value: spec.null_value as f32,
                epsg: spec.epsg,
                compression: spec.compression,
                levels: &levels,
            };
            for file in encode(&ctx, &snaps)? {
                outputs.push((file.filename, file.data));
            }
        }

        for (filename, data) in &outputs {
            manifest.add_output(filename);
            let key = StoragePath::output(request_id, filename);
            self.uploads.put(&key, data.clone()).await?;
        }

        let manifest_key = StoragePath::output(request_id, "filelist.json");
        self.uploads
            .put(&manifest_key, Bytes::from(manifest.to_bytes()))
            .await?;

        let message = json!({
            "message": "Build complete",
            "coverage": plan.coverage_summary(),
            "output_files": outputs.iter().map(|(f, _)| f.clone()).collect::<Vec<_>>(),
        });
        self.requests
            .set_status(request_id, RequestStatus::Completed, &message)
            .await?;

        info!(outputs = outputs.len(), "Build complete");
        Ok(())
    }

    /// Regrid every (time step, domain) pair and resolve the stack.
    async fn assemble_snaps(
        &mut self,
        spec: &RequestSpec,
        gridded: &[&selection::DomainPlan],
    ) -> MetGetResult<Vec<Snap>> {
        let composer = StackComposer {
            variables: spec.data_type,
            backfill: spec.backfill,
            null_value: spec.null_value as f32,
            background_pressure: spec.background_pressure as f32,
        };

        let times = spec.time_axis();
        let mut snaps = Vec::with_capacity(times.len());

        for (step, time) in times.iter().enumerate() {
            let mut layers = Vec::with_capacity(gridded.len());
            for domain_plan in gridded {
                let domain = &spec.domains[domain_plan.domain_index];
                let grid = domain.grid.clone().ok_or_else(|| {
                    MetGetError::Internal("gridded domain without a grid".to_string())
                })?;

                let slots = domain_plan.slots();
                let entry = slots.get(step).and_then(|s| s.entry.as_ref());
                let field: Option<GriddedField> = match entry {
                    Some(entry) => {
                        let payload = self.fetch(&entry.storage_key).await?;
                        Some(self.regridder.regrid(
                            &payload,
                            domain_plan.service,
                            spec.data_type,
                            &grid,
                        )?)
                    }
                    None => None,
                };
                layers.push(Layer { grid, field });
            }

            let resolved = composer.compose(layers);
            snaps.push(Snap {
                time: *time,
                domains: resolved,
            });
        }

        Ok(snaps)
    }

    async fn fetch(&mut self, key: &str) -> MetGetResult<Bytes> {
        if let Some(hit) = self.cache.get(key) {
            return Ok(hit);
        }
        let data = self.fields.get(key).await?;
        self.cache.put(key, data.clone());
        Ok(data)
    }
}

