#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, ImageOutputFormat, Rgb, Rgba};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write a small gradient PNG and return its path
pub fn create_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let img = ImageBuffer::from_fn(32, 24, |x, y| Rgba([(x * 8) as u8, (y * 10) as u8, 90, 255]));
    DynamicImage::ImageRgba8(img)
        .save_with_format(&path, image::ImageFormat::Png)
        .unwrap();
    path
}

/// Write a single-row PNG `width` pixels wide
pub fn create_wide_png(dir: &Path, name: &str, width: u32) -> PathBuf {
    let path = dir.join(name);
    let img = ImageBuffer::from_fn(width, 1, |x, _| Rgb([(x % 256) as u8, 60, 120]));
    DynamicImage::ImageRgb8(img)
        .save_with_format(&path, image::ImageFormat::Png)
        .unwrap();
    path
}

/// Write a small gradient JPEG and return its path
pub fn create_jpeg(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let img = ImageBuffer::from_fn(32, 24, |x, y| Rgb([(y * 10) as u8, (x * 8) as u8, 40]));
    let mut file = File::create(&path).unwrap();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut file, ImageOutputFormat::Jpeg(90))
        .unwrap();
    path
}

/// Write arbitrary bytes under an image-looking name
pub fn create_dummy(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    let mut file = File::create(&path).unwrap();
    file.write_all(contents).unwrap();
    path
}

/// Directory with three convertible images, one text file and a nested
/// image that must not be picked up
pub fn create_image_directory(base_dir: &Path) -> (PathBuf, Vec<PathBuf>) {
    let dir = base_dir.join("photos");
    fs::create_dir_all(dir.join("nested")).unwrap();

    let images = vec![
        create_png(&dir, "one.png"),
        create_jpeg(&dir, "two.jpg"),
        create_jpeg(&dir, "three.JPEG"),
    ];
    create_dummy(&dir, "notes.txt", b"NOT AN IMAGE");
    create_png(&dir.join("nested"), "deep.png");

    (dir, images)
}

pub fn is_webp(path: &Path) -> bool {
    let bytes = fs::read(path).unwrap();
    bytes.len() > 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
}
