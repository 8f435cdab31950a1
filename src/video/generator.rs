use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, info};

use super::command::{FfmpegCommand, FfmpegRunner};
use super::probe::probe_duration;
use super::{MediaError, VideoAssembler};
use crate::api::{is_cancelled, CancelSignal};
use crate::config::RenderConfig;
use crate::error::{Result, VideoError};
use crate::scene::{NarrationAudio, SceneImage, SubtitleCue, VideoArtifact};

const OUTPUT_FORMAT: &str = "mp4";

/// On-screen timing of the stills.
///
/// Every image gets an equal slice of the narration. Consecutive images
/// cross-dissolve starting at the slice boundary, so all inputs but the last
/// are looped for `slice + dissolve`.
#[derive(Debug, Clone, PartialEq)]
pub struct SlideshowPlan {
    pub image_count: usize,
    pub total_duration: f64,
    pub slice: f64,
    pub dissolve: f64,
}

impl SlideshowPlan {
    /// `dissolve_secs` is clamped to half a slice so transitions never overlap.
    pub fn new(image_count: usize, total_duration: f64, dissolve_secs: f64) -> Result<Self> {
        if image_count == 0 {
            return Err(VideoError::assembly("no images to assemble"));
        }
        if !total_duration.is_finite() || total_duration <= 0.0 {
            return Err(VideoError::assembly(format!(
                "invalid narration duration: {}",
                total_duration
            )));
        }

        let slice = total_duration / image_count as f64;
        let dissolve = if image_count == 1 {
            0.0
        } else {
            dissolve_secs.max(0.0).min(slice / 2.0)
        };

        Ok(Self {
            image_count,
            total_duration,
            slice,
            dissolve,
        })
    }

    /// How long input `index` is looped for.
    pub fn input_length(&self, index: usize) -> f64 {
        if index + 1 < self.image_count {
            self.slice + self.dissolve
        } else {
            self.slice
        }
    }

    /// Start of each cross-dissolve, one per consecutive pair.
    pub fn transition_offsets(&self) -> Vec<f64> {
        if self.dissolve <= 0.0 {
            return Vec::new();
        }
        (1..self.image_count).map(|k| k as f64 * self.slice).collect()
    }
}

/// Assembles the final video with a single FFmpeg invocation.
#[derive(Debug, Clone)]
pub struct VideoGenerator {
    render: RenderConfig,
}

impl VideoGenerator {
    pub fn new(render: RenderConfig) -> Self {
        Self { render }
    }

    pub fn plan(&self, image_count: usize, duration: f64) -> Result<SlideshowPlan> {
        SlideshowPlan::new(image_count, duration, self.render.dissolve_secs)
    }

    /// Builds the `-filter_complex` graph. Output label is `[vout]`.
    pub fn filter_graph(&self, plan: &SlideshowPlan, captions: &[(PathBuf, SubtitleCue)]) -> String {
        let (w, h) = (self.render.width, self.render.height);
        let mut filters = Vec::new();

        // Scale to cover the frame, then center-crop to exact size
        for i in 0..plan.image_count {
            filters.push(format!(
                "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1,fps={fps},format=yuv420p,settb=AVTB[s{i}]",
                i = i,
                w = w,
                h = h,
                fps = self.render.fps
            ));
        }

        let mut current = "s0".to_string();
        for (k, offset) in plan.transition_offsets().into_iter().enumerate() {
            let next = k + 1;
            let out = format!("x{}", next);
            filters.push(format!(
                "[{}][s{}]xfade=transition=fade:duration={:.3}:offset={:.3}[{}]",
                current, next, plan.dissolve, offset, out
            ));
            current = out;
        }

        let overlays: Vec<String> = captions
            .iter()
            .map(|(path, cue)| self.drawtext(path, cue))
            .collect();
        let caption_chain = if overlays.is_empty() {
            "null".to_string()
        } else {
            overlays.join(",")
        };
        filters.push(format!("[{}]{}[vout]", current, caption_chain));

        filters.join(";")
    }

    fn drawtext(&self, text_file: &Path, cue: &SubtitleCue) -> String {
        let font = match &self.render.font_file {
            Some(path) => format!("fontfile='{}'", quote_path(path)),
            None => r"font='Sans\:style=Bold'".to_string(),
        };
        format!(
            "drawtext=textfile='{}':expansion=none:{}:fontsize={}:fontcolor=white:borderw=5:bordercolor=black:box=1:boxcolor=black@0.45:boxborderw=18:x=(w-text_w)/2:y=h*0.72:enable='gte(t,{:.3})*lt(t,{:.3})'",
            quote_path(text_file),
            font,
            self.render.font_size,
            cue.start,
            cue.end
        )
    }

    /// Builds the full invocation for files already laid out in the work dir.
    pub fn build_command(
        &self,
        plan: &SlideshowPlan,
        image_paths: &[PathBuf],
        audio_path: &Path,
        captions: &[(PathBuf, SubtitleCue)],
        output_path: &Path,
    ) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(output_path);
        for (i, path) in image_paths.iter().enumerate() {
            cmd = cmd.looped_image(path, self.render.fps, plan.input_length(i));
        }
        let audio_index = image_paths.len();

        cmd.input(Vec::<String>::new(), audio_path)
            .filter_complex(self.filter_graph(plan, captions))
            .map("[vout]")
            .map(format!("{}:a:0", audio_index))
            .video_codec("libx264")
            .output_args(["-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p"])
            .frame_rate(self.render.fps)
            .audio_codec("aac")
            .audio_bitrate("192k")
            .duration(plan.total_duration)
            .output_args(["-movflags", "+faststart"])
    }

    /// Writes every input into a fresh working directory under `work_root`.
    async fn prepare(
        &self,
        work_dir: &TempDir,
        images: &[SceneImage],
        narration: &NarrationAudio,
        cues: &[SubtitleCue],
    ) -> std::io::Result<(Vec<PathBuf>, PathBuf, Vec<(PathBuf, SubtitleCue)>)> {
        let mut image_paths = Vec::with_capacity(images.len());
        for (i, image) in images.iter().enumerate() {
            let path = work_dir.path().join(format!("scene_{:02}.{}", i, image.extension()));
            tokio::fs::write(&path, &image.data).await?;
            image_paths.push(path);
        }

        let audio_path = work_dir.path().join(format!("narration.{}", narration.format));
        tokio::fs::write(&audio_path, &narration.data).await?;

        let mut captions = Vec::with_capacity(cues.len());
        for (j, cue) in cues.iter().enumerate() {
            let path = work_dir.path().join(format!("cue_{:03}.txt", j));
            tokio::fs::write(&path, cue.display_text()).await?;
            captions.push((path, cue.clone()));
        }

        Ok((image_paths, audio_path, captions))
    }
}

#[async_trait]
impl VideoAssembler for VideoGenerator {
    async fn assemble(
        &self,
        images: &[SceneImage],
        narration: &NarrationAudio,
        cues: &[SubtitleCue],
        cancel: CancelSignal,
    ) -> Result<VideoArtifact> {
        let plan = self.plan(images.len(), narration.duration)?;
        info!(
            "Assembling {} images over {:.2}s ({:.2}s per slice, {:.2}s dissolve, {} captions)",
            plan.image_count,
            plan.total_duration,
            plan.slice,
            plan.dissolve,
            cues.len()
        );

        // Removed on drop, whichever way this function exits
        let work_dir = tempfile::Builder::new()
            .prefix("shortform-")
            .tempdir_in(&self.render.work_root)
            .map_err(|e| VideoError::assembly(format!("failed to create working directory: {}", e)))?;
        debug!("Working directory: {}", work_dir.path().display());

        let (image_paths, audio_path, captions) = self
            .prepare(&work_dir, images, narration, cues)
            .await
            .map_err(|e| VideoError::assembly(format!("failed to write working files: {}", e)))?;

        if is_cancelled(&cancel) {
            return Err(VideoError::Cancelled);
        }

        let output_path = work_dir.path().join(format!("video.{}", OUTPUT_FORMAT));
        let cmd = self.build_command(&plan, &image_paths, &audio_path, &captions, &output_path);

        FfmpegRunner::new(&self.render.ffmpeg_path)
            .with_cancel(cancel)
            .run(&cmd)
            .await
            .map_err(|e| match e {
                MediaError::Cancelled => VideoError::Cancelled,
                other => VideoError::assembly(other.diagnostic()),
            })?;

        let data = tokio::fs::read(&output_path)
            .await
            .map_err(|e| VideoError::assembly(format!("encoder produced no output: {}", e)))?;
        if data.is_empty() {
            return Err(VideoError::assembly("encoder produced an empty file"));
        }

        probe_duration(&self.render.ffprobe_path, &output_path)
            .await
            .map_err(|e| VideoError::assembly(format!("encoded output is not decodable: {}", e.diagnostic())))?;

        info!("Video assembled: {} bytes", data.len());

        Ok(VideoArtifact::new(
            data,
            self.render.width,
            self.render.height,
            narration.duration,
            OUTPUT_FORMAT,
        ))
    }
}

/// Escapes a path for use inside a single-quoted filter option.
fn quote_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace('\'', r"'\''")
        .replace(':', r"\:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::never_cancel;
    use crate::scene::ImageModel;
    use tokio::sync::watch;

    fn generator(work_root: &Path) -> VideoGenerator {
        VideoGenerator::new(RenderConfig {
            work_root: work_root.to_path_buf(),
            ..RenderConfig::default()
        })
    }

    fn cue(start: f64, end: f64) -> SubtitleCue {
        SubtitleCue {
            words: vec!["wake".into(), "up".into()],
            start,
            end,
        }
    }

    #[test]
    fn three_images_over_measured_narration() {
        let plan = SlideshowPlan::new(3, 28.4, 0.5).unwrap();
        assert!((plan.slice - 9.4667).abs() < 1e-3);
        assert_eq!(plan.dissolve, 0.5);
        assert!((plan.input_length(0) - (plan.slice + 0.5)).abs() < 1e-9);
        assert!((plan.input_length(2) - plan.slice).abs() < 1e-9);

        let offsets = plan.transition_offsets();
        assert_eq!(offsets.len(), 2);
        assert!((offsets[0] - plan.slice).abs() < 1e-9);
        assert!((offsets[1] - 2.0 * plan.slice).abs() < 1e-9);

        // xfade output length: last offset plus the last input's length
        let total = offsets[1] + plan.input_length(2);
        assert!((total - 28.4).abs() < 1e-9);
    }

    #[test]
    fn single_image_has_no_transition() {
        let plan = SlideshowPlan::new(1, 20.0, 0.5).unwrap();
        assert_eq!(plan.slice, 20.0);
        assert_eq!(plan.dissolve, 0.0);
        assert!(plan.transition_offsets().is_empty());
        assert_eq!(plan.input_length(0), 20.0);
    }

    #[test]
    fn dissolve_is_clamped_for_short_slices() {
        let plan = SlideshowPlan::new(10, 4.0, 1.0).unwrap();
        assert!((plan.dissolve - 0.2).abs() < 1e-9);
        assert!(plan.dissolve < plan.slice);
    }

    #[test]
    fn empty_image_list_is_rejected() {
        assert!(matches!(
            SlideshowPlan::new(0, 10.0, 0.5),
            Err(VideoError::Assembly { .. })
        ));
        assert!(SlideshowPlan::new(2, 0.0, 0.5).is_err());
    }

    #[test]
    fn filter_graph_chains_dissolves_and_captions() {
        let assembler = generator(Path::new("/tmp"));
        let plan = assembler.plan(3, 28.4).unwrap();
        let captions = vec![
            (PathBuf::from("/w/cue_000.txt"), cue(0.0, 14.2)),
            (PathBuf::from("/w/cue_001.txt"), cue(14.2, 28.4)),
        ];
        let graph = assembler.filter_graph(&plan, &captions);

        assert_eq!(graph.matches("xfade=").count(), 2);
        assert!(graph.contains("[s0][s1]xfade=transition=fade:duration=0.500:offset=9.467[x1]"));
        assert!(graph.contains("[x1][s2]xfade=transition=fade:duration=0.500:offset=18.933[x2]"));
        assert!(graph.contains("scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920"));
        assert_eq!(graph.matches("drawtext=").count(), 2);
        assert!(graph.contains("enable='gte(t,14.200)*lt(t,28.400)'"));
        assert!(graph.contains("textfile='/w/cue_001.txt'"));
        assert!(graph.ends_with("[vout]"));
    }

    #[test]
    fn captions_use_a_bold_face() {
        let assembler = generator(Path::new("/tmp"));
        let line = assembler.drawtext(Path::new("/w/cue_000.txt"), &cue(0.0, 2.0));
        assert!(line.contains(r"font='Sans\:style=Bold'"));

        let custom = VideoGenerator::new(RenderConfig {
            font_file: Some(PathBuf::from("/fonts/Inter-Bold.ttf")),
            ..RenderConfig::default()
        });
        let line = custom.drawtext(Path::new("/w/cue_000.txt"), &cue(0.0, 2.0));
        assert!(line.contains("fontfile='/fonts/Inter-Bold.ttf'"));
        assert!(!line.contains("font='Sans"));
    }

    #[test]
    fn filter_graph_without_captions_passes_video_through() {
        let assembler = generator(Path::new("/tmp"));
        let plan = assembler.plan(1, 12.0).unwrap();
        let graph = assembler.filter_graph(&plan, &[]);

        assert!(!graph.contains("xfade"));
        assert!(!graph.contains("drawtext"));
        assert!(graph.ends_with("[s0]null[vout]"));
    }

    #[test]
    fn command_maps_narration_as_only_audio_track() {
        let assembler = generator(Path::new("/tmp"));
        let plan = assembler.plan(2, 20.0).unwrap();
        let images = vec![PathBuf::from("a.png"), PathBuf::from("b.png")];
        let args = assembler
            .build_command(&plan, &images, Path::new("n.mp3"), &[], Path::new("out.mp4"))
            .build_args();

        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);
        assert!(args.windows(2).any(|w| w == ["-map", "2:a:0"]));
        assert!(args.windows(2).any(|w| w == ["-map", "[vout]"]));
        assert!(args.windows(2).any(|w| w == ["-t", "20.000"]));
        assert!(args.windows(2).any(|w| w == ["-t", "10.500"]));
    }

    #[test]
    fn quote_path_escapes_filter_specials() {
        assert_eq!(quote_path(Path::new("C:\\tmp\\it's.txt")), r"C\:/tmp/it'\''s.txt");
    }

    #[tokio::test]
    async fn cancelled_assembly_leaves_no_working_files() {
        let root = tempfile::tempdir().unwrap();
        let assembler = generator(root.path());
        let images = vec![SceneImage::new(
            0,
            "scene".into(),
            "prompt".into(),
            crate::api::tests::TINY_PNG.to_vec(),
            ImageModel::Primary,
            "gpt-image-1".into(),
        )];
        let narration = NarrationAudio::new(vec![1, 2, 3], 12.0, "v1", "mp3");
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let err = assembler.assemble(&images, &narration, &[cue(0.0, 12.0)], rx).await.unwrap_err();

        assert!(matches!(err, VideoError::Cancelled));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn missing_encoder_is_an_assembly_failure() {
        let root = tempfile::tempdir().unwrap();
        let assembler = VideoGenerator::new(RenderConfig {
            work_root: root.path().to_path_buf(),
            ffmpeg_path: PathBuf::from("no-such-ffmpeg-binary"),
            ..RenderConfig::default()
        });
        let images = vec![SceneImage::new(
            0,
            "scene".into(),
            "prompt".into(),
            crate::api::tests::TINY_PNG.to_vec(),
            ImageModel::Primary,
            "gpt-image-1".into(),
        )];
        let narration = NarrationAudio::new(vec![1, 2, 3], 12.0, "v1", "mp3");

        let err = assembler.assemble(&images, &narration, &[], never_cancel()).await.unwrap_err();

        assert!(matches!(err, VideoError::Assembly { .. }));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
