use image::{ImageBuffer, Luma, Rgb};
use sfm_depth::{DepthReader, Error, PngDepthReader};
use std::collections::HashMap;

#[test]
fn reads_millimeter_png() {
    let dir = tempfile::tempdir().unwrap();
    let raw: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_raw(3, 2, vec![0, 500, 1000, 2500, 65535, 1]).unwrap();
    raw.save(dir.path().join("000010.png")).unwrap();

    let reader = PngDepthReader::new(dir.path());
    let map = reader.read("000010.jpg").unwrap();
    assert_eq!((map.width(), map.height()), (3, 2));
    assert!(map.depth(0, 0).unwrap().is_nan());
    assert_eq!(map.depth(1, 0), Some(0.5));
    assert_eq!(map.depth(2, 0), Some(1.0));
    assert_eq!(map.depth(0, 1), Some(2.5));
    assert_eq!(map.depth(1, 1), Some(65.535));
    assert_eq!(map.depth(2, 1), Some(0.001));
    assert_eq!(map.num_valid(), 5);
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let reader = PngDepthReader::new(dir.path());
    match reader.read("nope.jpg") {
        Err(Error::Image { path, .. }) => assert_eq!(path, dir.path().join("nope.png")),
        other => panic!("expected an image error, got {:?}", other),
    }
}

#[test]
fn color_png_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let rgb: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(2, 2, Rgb([1, 2, 3]));
    rgb.save(dir.path().join("rgb.png")).unwrap();
    let reader = PngDepthReader::new(dir.path());
    assert!(matches!(
        reader.read("rgb.jpg"),
        Err(Error::UnsupportedFormat { .. })
    ));
}

#[test]
fn in_memory_reader_reports_missing_image() {
    let maps: HashMap<String, sfm_depth::DepthMap> = HashMap::new();
    assert!(matches!(maps.read("a.jpg"), Err(Error::Missing(name)) if name == "a.jpg"));
}
