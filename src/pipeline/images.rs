//! Per-scene image generation with bounded concurrency.

use futures::stream::{self, StreamExt};
use tracing::{debug, info};

use crate::api::SceneImageGenerator;
use crate::error::{Result, VideoError};
use crate::scene::SceneImage;

/// Generates one image per scene, at most `concurrency` at a time.
///
/// Results land in index-addressed slots, so the returned list follows
/// `scenes` order whatever order the calls finish in. The first failure
/// stops the stage; calls still in flight are dropped.
pub async fn generate_in_order(
    generator: &SceneImageGenerator,
    scenes: &[String],
    concurrency: usize,
) -> Result<Vec<SceneImage>> {
    let limit = concurrency.max(1);
    info!("Generating {} scene images ({} at a time)", scenes.len(), limit);

    let mut slots: Vec<Option<SceneImage>> = vec![None; scenes.len()];
    let mut results = stream::iter(scenes.iter().enumerate())
        .map(|(index, description)| async move { (index, generator.generate(index, description).await) })
        .buffer_unordered(limit);

    while let Some((index, result)) = results.next().await {
        let image = result?;
        debug!("Scene {} served by {} model", index, image.model);
        slots[index] = Some(image);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or_else(|| VideoError::image(index, "no image was produced")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::tests::TINY_PNG;
    use crate::api::{ImageBackend, ImageCallError};
    use crate::scene::ImageModel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Earlier scenes take longer, so completion order is reversed.
    struct SlowFirst {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ImageBackend for SlowFirst {
        async fn render(&self, _model: ImageModel, prompt: &str) -> std::result::Result<Vec<u8>, ImageCallError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let index: u64 = prompt
                .split("scene ")
                .nth(1)
                .and_then(|rest| rest.split('.').next())
                .and_then(|n| n.parse().ok())
                .unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(60 - index * 10)).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(TINY_PNG.to_vec())
        }
    }

    struct FailsOn(usize);

    #[async_trait]
    impl ImageBackend for FailsOn {
        async fn render(&self, _model: ImageModel, prompt: &str) -> std::result::Result<Vec<u8>, ImageCallError> {
            if prompt.contains(&format!("scene {}.", self.0)) {
                Err(ImageCallError::Failed("HTTP 500: upstream error".into()))
            } else {
                Ok(TINY_PNG.to_vec())
            }
        }
    }

    fn scenes(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("scene {}", i)).collect()
    }

    #[tokio::test]
    async fn output_follows_scene_order_not_completion_order() {
        let backend = Arc::new(SlowFirst {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let generator = SceneImageGenerator::new(backend.clone());

        let images = generate_in_order(&generator, &scenes(5), 3).await.unwrap();

        let order: Vec<usize> = images.iter().map(|i| i.scene_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        for (i, image) in images.iter().enumerate() {
            assert_eq!(image.scene_description, format!("scene {}", i));
        }
        assert!(backend.peak.load(Ordering::SeqCst) <= 3);
        assert!(backend.peak.load(Ordering::SeqCst) > 1);
    }

    #[tokio::test]
    async fn failing_scene_is_reported_by_index() {
        let generator = SceneImageGenerator::new(Arc::new(FailsOn(2)));
        let err = generate_in_order(&generator, &scenes(4), 2).await.unwrap_err();
        assert!(matches!(err, VideoError::ImageGeneration { scene_index: 2, .. }));
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let generator = SceneImageGenerator::new(Arc::new(FailsOn(usize::MAX)));
        let images = generate_in_order(&generator, &scenes(2), 0).await.unwrap();
        assert_eq!(images.len(), 2);
    }
}
