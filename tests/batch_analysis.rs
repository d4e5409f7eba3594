use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};

use firewatch::{analyze_batch, BatchImage};

fn encode(image: &RgbImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format).expect("encode test image");
    bytes.into_inner()
}

fn scene(fire: bool) -> RgbImage {
    let mut image = RgbImage::from_pixel(120, 90, Rgb([20, 30, 40]));
    if fire {
        for y in 10..80 {
            for x in 20..100 {
                image.put_pixel(x, y, Rgb([250, 110, 10]));
            }
        }
    }
    image
}

#[test]
fn corrupt_image_is_omitted_and_order_is_kept() {
    let images = vec![
        BatchImage::new("kitchen.png", encode(&scene(true), ImageFormat::Png)),
        BatchImage::new("broken.jpg", b"definitely not an image".to_vec()),
        BatchImage::new("hallway.jpg", encode(&scene(false), ImageFormat::Jpeg)),
    ];

    let results = analyze_batch(&images);

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].name, "kitchen.png");
    assert!(results[0].detected);
    assert!(results[0].confidence > 25.0 && results[0].confidence <= 100.0);
    assert_eq!(results[1].name, "hallway.jpg");
    assert!(!results[1].detected);
    assert_eq!(results[1].confidence, 0.0);
}

#[test]
fn empty_batch_yields_no_results() {
    assert!(analyze_batch(&[]).is_empty());
}

#[test]
fn results_serialize_with_plain_fields() {
    let images = vec![BatchImage::new(
        "yard.png",
        encode(&scene(false), ImageFormat::Png),
    )];
    let results = analyze_batch(&images);
    let json = serde_json::to_value(&results).expect("serialize");
    assert_eq!(
        json,
        serde_json::json!([{"name": "yard.png", "detected": false, "confidence": 0.0}])
    );
}
