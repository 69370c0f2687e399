//! Integration tests: galleries opened through the registry, written and
//! read back from scratch files.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use gallery::codec::sequence::{write_compressed_frame, FrameLayout, SeqHeader};
use gallery::codec::universal::{
    ALGORITHM_ID_KEY, FIRST_EYE_KEY, FRONTAL_FACE_KEY, SECOND_EYE_KEY, URL_KEY,
};
use gallery::core::FrameDecoder;
use gallery::gallery::{memory, SeqGallery};
use gallery::prelude::*;

use tempfile::TempDir;

fn path_str(dir: &TempDir, rel: &str) -> String {
    dir.path().join(rel).to_string_lossy().into_owned()
}

fn numbered(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::with_label(format!("img{}.jpg", i), (i % 3) as i64)
                .with_matrix(Matrix::from_bytes(vec![i as u8; 8]))
        })
        .collect()
}

fn write_all(descriptor: &str, records: &[Record]) {
    let mut g = gallery::open(descriptor).expect("open for writing");
    g.write_block(records).expect("write");
    g.close().expect("close");
}

#[test]
fn test_block_count_is_ceil() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_str(&dir, "faces.gal");
    write_all(&path, &numbered(25));

    let mut g = gallery::open(&format!("{}[blockSize=10]", path)).unwrap();
    let mut sizes = Vec::new();
    loop {
        let block = g.next_block().unwrap();
        sizes.push(block.len());
        if block.done {
            break;
        }
    }
    assert_eq!(sizes, vec![10, 10, 5]);

    // A seekable source starts over
    let again = g.next_block().unwrap();
    assert_eq!(again.records[0].name, "img0.jpg");
}

#[test]
fn test_progress_is_monotonic() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_str(&dir, "p.gal");
    write_all(&path, &numbered(7));

    let mut g = gallery::open(&path).unwrap();
    let total = g.total_size().unwrap();
    let mut last = 0;
    for r in g.read_all().unwrap() {
        let p = r.progress().unwrap();
        assert!(p > last);
        last = p;
    }
    assert_eq!(last as u64, total);
}

#[test]
fn test_failed_enrollment_is_smaller_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let full = path_str(&dir, "full.gal");
    let sparse = path_str(&dir, "sparse.gal");

    let record = Record::new("a.jpg").with_matrix(Matrix::from_bytes(vec![7; 256]));
    let mut failed = record.clone();
    failed.set_fte(true);
    write_all(&full, &[record]);
    write_all(&sparse, &[failed]);

    let full_len = fs::metadata(&full).unwrap().len();
    let sparse_len = fs::metadata(&sparse).unwrap().len();
    assert!(sparse_len + 256 <= full_len);

    let back = gallery::open(&sparse).unwrap().read_all().unwrap();
    assert_eq!(back.len(), 1);
    assert!(back[0].is_fte());
    assert!(back[0].is_empty());
}

#[test]
fn test_destination_directories_created() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_str(&dir, "a/b/c/out.gal");
    write_all(&path, &numbered(2));
    assert!(Path::new(&path).is_file());
}

#[test]
fn test_universal_template_sentinel_eyes() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_str(&dir, "faces.ut");
    let features: Vec<u8> = (0..40).collect();
    let record = Record::new("probe.jpg")
        .with(ALGORITHM_ID_KEY, -2i64)
        .with(URL_KEY, "probe.jpg")
        .with(FRONTAL_FACE_KEY, Rect::new(10.0, 20.0, 100.0, 120.0))
        .with(FIRST_EYE_KEY, Point::new(40.0, 60.0))
        .with(SECOND_EYE_KEY, Point::new(80.0, 61.0))
        .with_matrix(Matrix::from_bytes(features.clone()));
    let plain = Record::new("other.jpg")
        .with(ALGORITHM_ID_KEY, 5i64)
        .with("Label", 3i64)
        .with_matrix(Matrix::from_bytes(vec![9; 4]));
    write_all(&path, &[record, plain]);

    let back = gallery::open(&path).unwrap().read_all().unwrap();
    assert_eq!(back.len(), 2);
    let md = &back[0].metadata;
    assert_eq!(back[0].matrix.as_ref().unwrap().data(), features.as_slice());
    assert_eq!(md.get_point(FIRST_EYE_KEY), Some(Point::new(40.0, 60.0)));
    assert_eq!(md.get_point(SECOND_EYE_KEY), Some(Point::new(80.0, 61.0)));
    assert_eq!(md.get_rect(FRONTAL_FACE_KEY), Some(Rect::new(10.0, 20.0, 100.0, 120.0)));
    assert_eq!(md.get_string(URL_KEY).as_deref(), Some("probe.jpg"));

    assert_eq!(back[1].label().as_deref(), Some("3"));
    assert_eq!(back[1].matrix.as_ref().unwrap().data(), &[9, 9, 9, 9]);
}

#[test]
fn test_missing_source_is_reported() {
    let mut g = gallery::open("/nonexistent/dir/x.gal").unwrap();
    assert!(matches!(g.next_block(), Err(Error::MissingSource(_))));
}

#[test]
fn test_memory_gallery_loads_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_str(&dir, "cached.gal");
    write_all(&path, &numbered(4));

    let mem = format!("{}.mem", path);
    let a = gallery::open(&mem).unwrap().read_all().unwrap();
    let b = gallery::open(&format!("{}[blockSize=3]", mem)).unwrap().read_all().unwrap();
    assert_eq!(a.len(), 4);
    assert_eq!(a, b);

    let cache = MemoryGalleries::global();
    let key = GalleryDescriptor::new(mem.as_str());
    let first = cache.get(&key).unwrap();
    gallery::open(&mem).unwrap();
    assert!(Arc::ptr_eq(&first, &cache.get(&key).unwrap()));
    cache.remove(&key);
}

#[test]
fn test_metadata_scan_strips_matrices() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_str(&dir, "scan.gal");
    write_all(&path, &numbered(23));

    let d = GalleryDescriptor::new(path.as_str());
    let records = memory::metadata_scan(&d, true).unwrap();
    assert_eq!(records.len(), 23);
    assert!(records.iter().all(|r| r.matrix.is_none()));

    // Served from the cache once the source is gone
    fs::remove_file(&path).unwrap();
    assert_eq!(memory::metadata_scan(&d, true).unwrap().len(), 23);
    MemoryGalleries::global().remove(&memory::metadata_key(&d));
}

#[test]
fn test_directory_listing() {
    let dir = tempfile::tempdir().unwrap();
    for rel in ["sam/2.jpg", "sam/10.jpg", "ann/1.png", "ann/x.txt", "top.jpg"] {
        let p = dir.path().join(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(p, b"x").unwrap();
    }
    let root = dir.path().to_string_lossy().into_owned();

    let listing = |descriptor: &str| -> Vec<(String, String)> {
        gallery::open(descriptor)
            .unwrap()
            .read_all()
            .unwrap()
            .into_iter()
            .map(|r| (r.file_name().to_string(), r.label().unwrap_or_default()))
            .collect()
    };

    let all = listing(&root);
    let names: Vec<&str> = all.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["1.png", "x.txt", "2.jpg", "10.jpg", "top.jpg"]);
    assert_eq!(all[2].1, "sam");
    assert_eq!(all, listing(&root));

    let jpgs = listing(&format!("{}[regexp=*.jpg]", root));
    assert_eq!(jpgs.len(), 3);
}

#[test]
fn test_csv_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = path_str(&dir, "meta.csv");
    let records = vec![
        Record::with_label("a.jpg", "alice").with("Eye", Point::new(1.0, 2.0)),
        Record::with_label("b.jpg", "bob"),
    ];
    write_all(&path, &records);

    let text = fs::read_to_string(&path).unwrap();
    assert!(text.starts_with("File,"));
    assert!(text.contains("Eye_X,Eye_Y"));

    let back = gallery::open(&path).unwrap().read_all().unwrap();
    assert_eq!(back.len(), 2);
    assert_eq!(back[1].name, "b.jpg");
    assert_eq!(back[1].label().as_deref(), Some("bob"));
}

fn raw_seq(dir: &TempDir, frames: u32) -> String {
    let header = SeqHeader {
        description: "lobby".into(),
        width: 3,
        height: 2,
        channels: 1,
        image_size: 6,
        format_code: 100,
        layout: FrameLayout::Raw,
        frame_count: frames,
        true_image_size: 6,
    };
    let mut bytes = header.encode().unwrap();
    for i in 0..frames {
        bytes.extend([i as u8; 6]);
    }
    let path = path_str(dir, "lobby.seq");
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn test_sequence_frames_with_annotations() {
    let dir = tempfile::tempdir().unwrap();
    let seq = raw_seq(&dir, 3);

    let annotations = path_str(&dir, "boxes.json");
    let mut boxes = Vec::new();
    for i in 0..2 {
        let mut r = Record::new(format!("frame{}", i));
        r.set_rects(vec![Rect::new(i as f64, 0.0, 4.0, 4.0)]);
        boxes.push(r);
    }
    write_all(&annotations, &boxes);

    let d = GalleryDescriptor::new(seq.as_str())
        .with("annotations", annotations.as_str())
        .with("blockSize", 2i64);
    let mut g = Registry::global().open(&d).unwrap();
    assert_eq!(g.total_size().unwrap(), 3);

    let first = g.next_block().unwrap();
    let second = g.next_block().unwrap();
    assert!(!first.done && second.done);

    let frames: Vec<Record> = first.records.into_iter().chain(second.records).collect();
    assert_eq!(frames.len(), 3);
    let m = frames[2].matrix.as_ref().unwrap();
    assert_eq!((m.rows(), m.cols(), m.channels()), (2, 3, 1));
    assert_eq!(m.data(), &[2; 6]);
    assert_eq!(frames[1].rects(), vec![Rect::new(1.0, 0.0, 4.0, 4.0)]);
    assert!(frames[2].rects().is_empty());
    assert_eq!(frames[2].metadata.get_i64("position"), Some(2));
    assert_eq!(frames[0].name, seq);
}

struct RawDecoder;

impl FrameDecoder for RawDecoder {
    fn decode(&self, bytes: &[u8]) -> gallery::Result<Matrix> {
        Ok(Matrix::from_bytes(bytes.to_vec()))
    }
}

#[test]
fn test_sequence_compressed_padding_probe() {
    let dir = tempfile::tempdir().unwrap();
    for padding in [8usize, 16] {
        let header = SeqHeader {
            description: String::new(),
            width: 0,
            height: 0,
            channels: 1,
            image_size: 0,
            format_code: 201,
            layout: FrameLayout::Compressed,
            frame_count: 4,
            true_image_size: 0,
        };
        let mut bytes = header.encode().unwrap();
        for i in 0..4u8 {
            write_compressed_frame(&mut bytes, &vec![i + 1; 3 + i as usize], padding).unwrap();
        }
        let path = path_str(&dir, &format!("pad{}.seq", padding));
        fs::write(&path, bytes).unwrap();

        let mut g = SeqGallery::new(GalleryDescriptor::new(path.as_str()))
            .unwrap()
            .with_decoder(Arc::new(RawDecoder));
        let frames = g.read_all().unwrap();
        let payloads: Vec<Vec<u8>> = frames
            .iter()
            .map(|r| r.matrix.as_ref().unwrap().data().to_vec())
            .collect();
        assert_eq!(
            payloads,
            vec![vec![1; 3], vec![2; 4], vec![3; 5], vec![4; 6]],
            "padding {}",
            padding
        );
    }
}

#[test]
fn test_unknown_suffix_is_single_record() {
    let mut g = gallery::open("picture.jpg[Label=7]").unwrap();
    assert_eq!(g.total_size().unwrap(), 1);
    let block = g.next_block().unwrap();
    assert!(block.done);
    assert_eq!(block.records[0].name, "picture.jpg");
}
