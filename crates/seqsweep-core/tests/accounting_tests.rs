use seqsweep_core::accounting::{sorted_entry_names, total_size};
use std::fs;
use tempfile::tempdir;

#[test]
fn test_hard_links_counted_once() {
    let tmp = tempdir().unwrap();
    let original = tmp.path().join("original.fastq.gz");
    let link = tmp.path().join("link.fastq.gz");
    fs::write(&original, vec![0u8; 1000]).unwrap();
    fs::hard_link(&original, &link).unwrap();

    let forward = total_size(&[original.clone(), link.clone()]).unwrap();
    assert_eq!(forward, 1000, "hard-linked inode must be counted once");

    // Input order must not matter.
    let reverse = total_size(&[link, original]).unwrap();
    assert_eq!(reverse, 1000);
}

#[test]
fn test_directories_recursed() {
    let tmp = tempdir().unwrap();
    let sub = tmp.path().join("a").join("b");
    fs::create_dir_all(&sub).unwrap();
    fs::write(sub.join("f1"), vec![0u8; 10]).unwrap();
    fs::write(tmp.path().join("a").join("f2"), vec![0u8; 20]).unwrap();

    assert_eq!(total_size(&[tmp.path().to_path_buf()]).unwrap(), 30);
}

#[test]
fn test_hard_link_inside_directory_not_double_counted() {
    let tmp = tempdir().unwrap();
    let dir = tmp.path().join("sample");
    fs::create_dir_all(&dir).unwrap();
    let original = dir.join("reads.fastq.gz");
    fs::write(&original, vec![0u8; 512]).unwrap();
    fs::hard_link(&original, dir.join("reads_link.fastq.gz")).unwrap();

    // Both the directory and one of the files are passed explicitly.
    let size = total_size(&[dir.clone(), original]).unwrap();
    assert_eq!(size, 512);
}

#[test]
fn test_missing_path_is_skipped() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("present"), vec![0u8; 5]).unwrap();
    let size = total_size(&[
        tmp.path().join("present"),
        tmp.path().join("vanished"),
    ])
    .unwrap();
    assert_eq!(size, 5);
}

#[test]
fn test_sorted_entry_names() {
    let tmp = tempdir().unwrap();
    fs::write(tmp.path().join("b"), "").unwrap();
    fs::write(tmp.path().join("a"), "").unwrap();
    fs::write(tmp.path().join("c"), "").unwrap();
    assert_eq!(sorted_entry_names(tmp.path()).unwrap(), vec!["a", "b", "c"]);
}
