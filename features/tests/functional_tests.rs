use cv_core::{AnyImage, TupleDescBinary};
use cv_features::*;
use image::{GrayImage, Luma};
use nalgebra::Point2;

/// Low contrast texture with three bright blobs, translated by `(dx, dy)`.
fn blob_frame(dx: u32, dy: u32) -> AnyImage {
    let mut img = GrayImage::new(80, 80);
    for y in 0..80u32 {
        for x in 0..80u32 {
            let (u, v) = (x + 10 - dx, y + 10 - dy);
            img.put_pixel(x, y, Luma([30 + ((u * 7 + v * 13 + u * v) % 11) as u8]));
        }
    }
    for &(bx, by, v) in &[(25u32, 25u32, 220u8), (50, 30, 160), (35, 50, 110)] {
        for y in by + dy..by + dy + 2 {
            for x in bx + dx..bx + dx + 2 {
                img.put_pixel(x, y, Luma([v]));
            }
        }
    }
    AnyImage::from(img)
}

fn detect_and_describe(
    detector: &mut FastDetector,
    brief: &Brief,
    image: &AnyImage,
) -> (Vec<Point2<f64>>, Vec<TupleDescBinary>) {
    detector.detect(image).unwrap();
    let mut points = Vec::new();
    let mut descs = Vec::new();
    for i in 0..detector.len() {
        let p = detector.location(i);
        if let Some(d) = brief.describe(image, p, 1.0, 0.0) {
            points.push(p);
            descs.push(d);
        }
    }
    (points, descs)
}

#[test]
fn test_fast_brief_greedy_recovers_translation() {
    let mut detector = FastDetector::new(FastConfig::default());
    let brief = Brief::new(BriefConfig::default());

    let (p0, d0) = detect_and_describe(&mut detector, &brief, &blob_frame(0, 0));
    let (p1, d1) = detect_and_describe(&mut detector, &brief, &blob_frame(4, 2));
    assert!(p0.len() >= 3);

    let mut associate = AssociateGreedy::new(
        ScoreHamming,
        AssociateConfig::default()
            .with_max_fit_error(0.0)
            .with_exclusive(),
    );
    let src: Vec<&TupleDescBinary> = d0.iter().collect();
    let dst: Vec<&TupleDescBinary> = d1.iter().collect();
    associate.associate(&src, &dst).unwrap();

    let matches = associate.matches();
    assert!(matches.len() >= 3);
    for m in matches {
        let delta = p1[m.dst] - p0[m.src];
        assert_eq!(delta.x, 4.0);
        assert_eq!(delta.y, 2.0);
    }
}

#[test]
fn test_preset_detections_with_ncc() {
    let mut texture = GrayImage::new(40, 40);
    for y in 0..40 {
        for x in 0..40 {
            texture.put_pixel(x, y, Luma([((x * 13 + y * 29 + x * y) % 200) as u8]));
        }
    }
    let image = AnyImage::from(texture);

    let mut detector = PresetDetections::new(vec![Point2::new(10.0, 10.0), Point2::new(25.0, 18.0)]);
    detector.detect(&image).unwrap();
    assert_eq!(detector.len(), 2);
    assert_eq!(detector.scale(0), 1.0);
    assert!(!detector.has_orientation());

    let describer = PixelRegionNcc::new(PixelRegionConfig::default());
    let descs: Vec<_> = (0..detector.len())
        .filter_map(|i| describer.describe(&image, detector.location(i), 1.0, 0.0))
        .collect();
    assert_eq!(descs.len(), 2);

    // Same regions in reverse order.
    let src: Vec<_> = descs.iter().collect();
    let dst: Vec<_> = descs.iter().rev().collect();
    let mut associate = AssociateGreedy::new(ScoreNcc, AssociateConfig::default());
    associate.associate(&src, &dst).unwrap();
    assert_eq!(associate.pairs(), &[1, 0]);
}

#[test]
fn test_empty_image_is_rejected() {
    let mut detector = PresetDetections::new(vec![]);
    let empty = AnyImage::from(GrayImage::new(0, 0));
    assert!(detector.detect(&empty).is_err());
}
