mod common;

use common::*;
use seqsweep_core::command::{DryRunRunner, ShellRunner};
use seqsweep_core::deleter::delivered::DeliveredDataDeleter;
use seqsweep_core::notify::LogNotifier;
use seqsweep_core::store::MetadataStore;
use seqsweep_core::{Deleter, DeletionContext, DeletionOptions};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

struct Fixture {
    cfg: seqsweep_core::AppConfig,
    client: FakeClient,
    lims: FakeLims,
    probe: FakeProbe,
    fastq: PathBuf,
    bam: PathBuf,
    delivered_file: PathBuf,
}

/// One delivered sample: a fastq under the fastq area, a bam under the
/// processed area and one delivered copy under
/// `<delivery>/<project>/<batch>/<user_sample_id>/`.
fn delivered_sample_fixture(root: &std::path::Path) -> Fixture {
    let cfg = test_config(root);
    let client = FakeClient::new();
    client.insert("samples", sample_doc("s1", "proj1", "none", "yes"));
    client.insert(
        "run_elements",
        run_element_doc("run1", "proj1", "s1", 1, "pass", "2025-01-01T00:00:00+00:00"),
    );

    let fastq = make_fastq(&cfg.fastq_dir, "run1", "proj1", "s1", 1, 100);

    let processed = cfg.processed_data_dir.join("proj1").join("s1");
    fs::create_dir_all(&processed).unwrap();
    let bam = processed.join("u_s1.bam");
    fs::write(&bam, vec![0u8; 200]).unwrap();

    let delivery = cfg.delivered_data_dir.join("proj1").join("batch1").join("u_s1");
    fs::create_dir_all(&delivery).unwrap();
    let delivered_file = delivery.join("u_s1.bam");
    fs::write(&delivered_file, vec![0u8; 200]).unwrap();

    let probe = FakeProbe::new();
    probe.set_archived(&fastq);
    probe.set_archived(&bam);

    Fixture {
        cfg,
        client,
        lims: FakeLims::new(),
        probe,
        fastq,
        bam,
        delivered_file,
    }
}

#[test]
fn test_delivered_copy_purged_and_originals_released() {
    let tmp = tempdir().unwrap();
    let fx = delivered_sample_fixture(tmp.path());

    let store = MetadataStore::new(&fx.client);
    let runner = ShellRunner::new(None);
    let notifier = LogNotifier;
    let ctx = DeletionContext::new(&fx.cfg, &runner, &notifier, DeletionOptions::default());
    let mut deleter = DeliveredDataDeleter::new(ctx, &store, &fx.lims, &fx.probe);

    let summary = deleter.delete_data().unwrap();
    assert_eq!(summary.units_processed, 1);

    // The delivered copy is gone; the originals are still on disk but
    // released from the fast tier.
    assert!(!fx.delivered_file.exists());
    assert!(fx.fastq.exists());
    assert!(fx.bam.exists());
    let released = fx.probe.released.borrow();
    assert!(released.contains(&fx.fastq));
    assert!(released.contains(&fx.bam));

    assert_eq!(
        fx.client.patched_fields("s1"),
        vec![json!({"data_deleted": "on lustre"})]
    );

    // The quarantine directory was purged.
    assert!(fs::read_dir(&fx.cfg.work_dir).unwrap().next().is_none());
}

#[test]
fn test_unarchived_file_excludes_sample() {
    let tmp = tempdir().unwrap();
    let fx = delivered_sample_fixture(tmp.path());
    // Reset the fastq to unarchived: the archival precondition must fail
    // closed before anything moves.
    let probe = FakeProbe::new();
    probe.set_archived(&fx.bam);

    let store = MetadataStore::new(&fx.client);
    let runner = ShellRunner::new(None);
    let notifier = LogNotifier;
    let ctx = DeletionContext::new(&fx.cfg, &runner, &notifier, DeletionOptions::default());
    let mut deleter = DeliveredDataDeleter::new(ctx, &store, &fx.lims, &probe);

    let summary = deleter.delete_data().unwrap();
    assert_eq!(summary.units_processed, 0);

    assert!(fx.delivered_file.exists());
    assert!(probe.released.borrow().is_empty());
    assert!(fx.client.patches.borrow().is_empty());
}

#[test]
fn test_missing_delivery_folder_skips_the_sample() {
    let tmp = tempdir().unwrap();
    let fx = delivered_sample_fixture(tmp.path());
    // The delivery folder vanished, so the sample cannot be resolved to a
    // purgeable set. Releasing the originals anyway would advance the
    // state machine with nothing purged.
    fs::remove_dir_all(fx.delivered_file.parent().unwrap()).unwrap();

    let store = MetadataStore::new(&fx.client);
    let runner = ShellRunner::new(None);
    let notifier = LogNotifier;
    let ctx = DeletionContext::new(&fx.cfg, &runner, &notifier, DeletionOptions::default());
    let mut deleter = DeliveredDataDeleter::new(ctx, &store, &fx.lims, &fx.probe);

    let summary = deleter.delete_data().unwrap();
    assert_eq!(summary.units_processed, 0);

    assert!(fx.fastq.exists());
    assert!(fx.bam.exists());
    assert!(fx.probe.released.borrow().is_empty());
    assert!(fx.client.patches.borrow().is_empty());
}

#[test]
fn test_ambiguous_delivery_folders_skip_the_sample() {
    let tmp = tempdir().unwrap();
    let fx = delivered_sample_fixture(tmp.path());
    // A second folder for the same user sample id in another batch. With
    // two matches there is no way to know which copies to purge, so the
    // sample sits out the pass with its delivered data untouched.
    let second = fx
        .cfg
        .delivered_data_dir
        .join("proj1")
        .join("batch2")
        .join("u_s1");
    fs::create_dir_all(&second).unwrap();

    let store = MetadataStore::new(&fx.client);
    let runner = ShellRunner::new(None);
    let notifier = LogNotifier;
    let ctx = DeletionContext::new(&fx.cfg, &runner, &notifier, DeletionOptions::default());
    let mut deleter = DeliveredDataDeleter::new(ctx, &store, &fx.lims, &fx.probe);

    let summary = deleter.delete_data().unwrap();
    assert_eq!(summary.units_processed, 0);

    assert!(fx.delivered_file.exists());
    assert!(fx.probe.released.borrow().is_empty());
    assert!(fx.client.patches.borrow().is_empty());
}

#[test]
fn test_dry_run_mutates_nothing() {
    let tmp = tempdir().unwrap();
    let fx = delivered_sample_fixture(tmp.path());

    let store = MetadataStore::new(&fx.client);
    let runner = DryRunRunner::new();
    let notifier = LogNotifier;
    let opts = DeletionOptions {
        dry_run: true,
        ..Default::default()
    };
    let ctx = DeletionContext::new(&fx.cfg, &runner, &notifier, opts);
    let mut deleter = DeliveredDataDeleter::new(ctx, &store, &fx.lims, &fx.probe);

    let summary = deleter.delete_data().unwrap();
    assert_eq!(summary.units_processed, 1);

    // Filesystem and metadata store are untouched, but the planned
    // commands were recorded verbatim.
    assert!(fx.delivered_file.exists());
    assert!(fx.probe.released.borrow().is_empty());
    assert!(fx.client.patches.borrow().is_empty());
    let commands = runner.commands();
    assert!(commands.iter().any(|c| c.starts_with("mv ")));
    assert!(commands.iter().any(|c| c.starts_with("rm -rf ")));
}

#[test]
fn test_identical_basenames_do_not_collide_in_quarantine() {
    let tmp = tempdir().unwrap();
    let fx = delivered_sample_fixture(tmp.path());

    // A second sample whose delivered file has the same basename as s1's.
    fx.client
        .insert("samples", sample_doc("s2", "proj1", "none", "yes"));
    let delivery2 = fx
        .cfg
        .delivered_data_dir
        .join("proj1")
        .join("batch1")
        .join("u_s2");
    fs::create_dir_all(&delivery2).unwrap();
    // Same basename as fx.delivered_file.
    let delivered2 = delivery2.join("u_s1.bam");
    fs::write(&delivered2, vec![0u8; 50]).unwrap();

    let store = MetadataStore::new(&fx.client);
    let runner = ShellRunner::new(None);
    let notifier = LogNotifier;
    let ctx = DeletionContext::new(&fx.cfg, &runner, &notifier, DeletionOptions::default());
    let mut deleter = DeliveredDataDeleter::new(ctx, &store, &fx.lims, &fx.probe);

    // s2 has no run elements or processed files, so only its delivered
    // copy is staged. If the UUID prefixing failed, the second mv would
    // clobber the first and verification would flag the missing name.
    let summary = deleter.delete_data().unwrap();
    assert_eq!(summary.units_processed, 2);
    assert!(!fx.delivered_file.exists());
    assert!(!delivered2.exists());
}

#[test]
fn test_zero_candidates_is_a_silent_noop() {
    let tmp = tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let client = FakeClient::new();
    let lims = FakeLims::new();
    let probe = FakeProbe::new();

    let store = MetadataStore::new(&client);
    let runner = ShellRunner::new(None);
    let notifier = LogNotifier;
    let ctx = DeletionContext::new(&cfg, &runner, &notifier, DeletionOptions::default());
    let mut deleter = DeliveredDataDeleter::new(ctx, &store, &lims, &probe);

    let summary = deleter.delete_data().unwrap();
    assert_eq!(summary.units_processed, 0);
}

#[test]
fn test_deletion_limit_caps_batch() {
    let tmp = tempdir().unwrap();
    let fx = delivered_sample_fixture(tmp.path());
    fx.client
        .insert("samples", sample_doc("s2", "proj1", "none", "yes"));

    let store = MetadataStore::new(&fx.client);
    let runner = ShellRunner::new(None);
    let notifier = LogNotifier;
    let opts = DeletionOptions {
        deletion_limit: Some(1),
        ..Default::default()
    };
    let ctx = DeletionContext::new(&fx.cfg, &runner, &notifier, opts);
    let mut deleter = DeliveredDataDeleter::new(ctx, &store, &fx.lims, &fx.probe);

    let summary = deleter.delete_data().unwrap();
    assert_eq!(summary.units_processed, 1);
    // Samples sort by id, so s1 was the one processed.
    assert_eq!(fx.client.patches.borrow().len(), 1);
}
