use futures::future::try_join_all;
use image::DynamicImage;
use pictor_core::{GeneratedVariant, ImageFormat, PipelineConfig, PipelineError, VariantSpec};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::governor::ConcurrencyGovernor;
use crate::sanitize::SanitizedImage;

/// Produces every configured rendition of a sanitized source.
///
/// The source is decoded once (one governor unit); each rendition is then its own
/// unit resizing and re-encoding the shared decoded image. The first failing
/// rendition fails the whole set.
pub struct VariantGenerator {
    governor: Arc<ConcurrencyGovernor>,
    decode_timeout: Duration,
    variant_timeout: Duration,
}

impl VariantGenerator {
    pub fn new(
        governor: Arc<ConcurrencyGovernor>,
        decode_timeout: Duration,
        variant_timeout: Duration,
    ) -> Self {
        Self {
            governor,
            decode_timeout,
            variant_timeout,
        }
    }

    pub fn from_config(governor: Arc<ConcurrencyGovernor>, config: &PipelineConfig) -> Self {
        Self::new(governor, config.decode_timeout(), config.variant_timeout())
    }

    #[tracing::instrument(skip(self, source, specs, cancel), fields(upload_id = %upload_id, variants = specs.len()))]
    pub async fn generate(
        &self,
        upload_id: Uuid,
        source: &SanitizedImage,
        specs: &[VariantSpec],
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneratedVariant>, PipelineError> {
        let result = self.generate_all(upload_id, source, specs, cancel).await;
        self.governor.release_source(upload_id);
        result
    }

    async fn generate_all(
        &self,
        upload_id: Uuid,
        source: &SanitizedImage,
        specs: &[VariantSpec],
        cancel: &CancellationToken,
    ) -> Result<Vec<GeneratedVariant>, PipelineError> {
        let start = Instant::now();
        let decode_source = source.clone();
        let decoded = self
            .governor
            .run_blocking("decode", self.decode_timeout, cancel, move |engine| {
                engine.decode_source(upload_id, &decode_source)
            })
            .await?;

        tracing::debug!(
            upload_id = %upload_id,
            width = decoded.width(),
            height = decoded.height(),
            duration_ms = start.elapsed().as_millis(),
            "Decoded source image"
        );

        // Dropping the remaining futures on the first error stops waiting for them;
        // their blocking work finishes on its own slot and is discarded.
        let source_format = source.format();
        let units = specs.iter().map(|spec| {
            self.render_one(decoded.clone(), spec.clone(), source_format, cancel)
        });
        let variants = try_join_all(units).await?;

        tracing::debug!(
            upload_id = %upload_id,
            count = variants.len(),
            duration_ms = start.elapsed().as_millis(),
            "Generated all variants"
        );
        Ok(variants)
    }

    async fn render_one(
        &self,
        decoded: Arc<DynamicImage>,
        spec: VariantSpec,
        source_format: ImageFormat,
        cancel: &CancellationToken,
    ) -> Result<GeneratedVariant, PipelineError> {
        let name = spec.name.clone();
        let result = self
            .governor
            .run_blocking("variant", self.variant_timeout, cancel, move |engine| {
                engine.render(&decoded, &spec, source_format)
            })
            .await;

        match &result {
            Ok(variant) => tracing::debug!(
                variant = %name,
                width = variant.width,
                height = variant.height,
                bytes = variant.byte_size,
                format = %variant.format,
                "Variant encoded"
            ),
            Err(e) => tracing::warn!(variant = %name, error = %e, "Variant generation failed"),
        }
        result
    }
}
