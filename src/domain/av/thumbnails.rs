use super::sampler::FrameSampler;
use crate::domain::detection::Detection;
use crate::domain::layout::MediaLayout;
use crate::domain::report::{best_detection, normalize_thumbnail_path};
use crate::error::ScanError;
use image::{ImageFormat, RgbImage};
use std::path::Path;

pub fn write_thumbnail(image: &RgbImage, path: &Path) -> Result<(), ScanError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save_with_format(path, ImageFormat::Jpeg)?;
    Ok(())
}

/// Pick the representative picture of a scan, relative to the upload root.
///
/// With detections, the highest scoring one's thumbnail is copied to
/// `{id}_best.jpg`. Without, the first frame of the source video becomes the
/// SFW thumbnail. Any failure here degrades to an empty string.
pub fn select_best_thumbnail(
    layout: &MediaLayout,
    video_id: &str,
    detections: &[Detection],
) -> String {
    match best_detection(detections) {
        Some(best) => promote_to_best(layout, video_id, &best.thumbnail),
        None => match write_sfw_thumbnail(layout, video_id) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!("no SFW thumbnail for {}: {}", video_id, e);
                String::new()
            }
        },
    }
}

fn promote_to_best(layout: &MediaLayout, video_id: &str, thumbnail: &str) -> String {
    if thumbnail.is_empty() {
        return String::new();
    }
    let source = layout.resolve(thumbnail);
    if !source.exists() {
        tracing::warn!("best thumbnail {:?} is missing", source);
        return String::new();
    }
    let best = layout.best_thumbnail_name(video_id);
    match std::fs::copy(&source, layout.resolve(&best)) {
        Ok(_) => best,
        Err(e) => {
            tracing::warn!("could not copy {:?} to {}: {}", source, best, e);
            normalize_thumbnail_path(thumbnail)
        }
    }
}

/// Decode the first frame of `{id}.mp4`, store it as `thumbs/{id}_f0.jpg`
/// and copy it to `{id}_best.jpg`.
pub fn write_sfw_thumbnail(layout: &MediaLayout, video_id: &str) -> Result<String, ScanError> {
    let frame = FrameSampler::open(&layout.video_path(video_id))?.first_frame()?;
    let frame_name = layout.frame_thumbnail_name(video_id, 0);
    let frame_path = layout.resolve(&frame_name);
    write_thumbnail(&frame, &frame_path)?;

    let best = layout.best_thumbnail_name(video_id);
    match std::fs::copy(&frame_path, layout.resolve(&best)) {
        Ok(_) => Ok(best),
        Err(e) => {
            tracing::warn!("could not copy {:?} to {}: {}", frame_path, best, e);
            Ok(frame_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::av::testing::write_clip;
    use crate::domain::detection::BodyType;
    use tempfile::tempdir;

    fn det(score: f64, thumbnail: &str) -> Detection {
        Detection {
            timestamp: 1.0,
            frame_index: 2,
            class: "A".to_string(),
            score,
            bbox: [0.0; 4],
            body_type: BodyType::Unknown,
            thumbnail: thumbnail.to_string(),
        }
    }

    #[test]
    fn test_write_thumbnail_creates_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("thumbs").join("x_f3.jpg");
        write_thumbnail(&RgbImage::new(8, 6), &path).unwrap();
        assert!(path.exists());
        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
    }

    #[test]
    fn test_best_detection_thumbnail_is_copied() {
        let dir = tempdir().unwrap();
        let layout = MediaLayout::new(dir.path());
        write_thumbnail(&RgbImage::new(4, 4), &layout.resolve("thumbs/v_f1.jpg")).unwrap();
        write_thumbnail(
            &RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0])),
            &layout.resolve("thumbs/v_f9.jpg"),
        )
        .unwrap();

        let best = select_best_thumbnail(
            &layout,
            "v",
            &[det(0.6, "thumbs/v_f1.jpg"), det(0.9, "thumbs\\v_f9.jpg")],
        );
        assert_eq!(best, "v_best.jpg");
        assert_eq!(
            std::fs::read(dir.path().join("v_best.jpg")).unwrap(),
            std::fs::read(dir.path().join("thumbs/v_f9.jpg")).unwrap()
        );
    }

    #[test]
    fn test_missing_thumbnail_gives_empty_best() {
        let dir = tempdir().unwrap();
        let layout = MediaLayout::new(dir.path());
        assert_eq!(select_best_thumbnail(&layout, "v", &[det(0.9, "thumbs/v_f1.jpg")]), "");
        assert_eq!(select_best_thumbnail(&layout, "v", &[det(0.9, "")]), "");
    }

    #[test]
    fn test_safe_video_gets_first_frame_as_best() {
        let dir = tempdir().unwrap();
        let layout = MediaLayout::new(dir.path());
        write_clip(&layout.video_path("v"), 64, 48, 30, 10);

        assert_eq!(select_best_thumbnail(&layout, "v", &[]), "v_best.jpg");
        let frame = image::open(dir.path().join("thumbs/v_f0.jpg")).unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert_eq!(
            std::fs::read(dir.path().join("v_best.jpg")).unwrap(),
            std::fs::read(dir.path().join("thumbs/v_f0.jpg")).unwrap()
        );
    }

    #[test]
    fn test_missing_source_leaves_sfw_best_empty() {
        let dir = tempdir().unwrap();
        let layout = MediaLayout::new(dir.path());
        assert_eq!(select_best_thumbnail(&layout, "gone", &[]), "");
        assert!(!dir.path().join("gone_best.jpg").exists());
    }
}
