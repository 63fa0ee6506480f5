mod common;

use common::FakeProbe;
use seqsweep_core::archive::ArchiveStateProbe;
use seqsweep_core::error::Error;
use std::path::Path;

#[test]
fn test_release_requires_archived() {
    let probe = FakeProbe::new();
    let path = Path::new("/lustre/run1/s1.bam");

    let err = probe.release(path).unwrap_err();
    assert!(matches!(err, Error::Archiving(_)));
    assert!(probe.released.borrow().is_empty());

    probe.set_archived(path);
    probe.release(path).unwrap();
    assert_eq!(probe.released.borrow().len(), 1);
    assert!(probe.is_released(path).unwrap());
}

#[test]
fn test_release_refuses_dirty_files() {
    let probe = FakeProbe::new();
    let path = Path::new("/lustre/run1/s1.bam");
    probe.set_dirty(path);

    let err = probe.release(path).unwrap_err();
    assert!(matches!(err, Error::Archiving(_)));
    assert!(probe.released.borrow().is_empty());
}
