//! End-to-end scenarios from spec.md §8's seed-test list: S1 (create +
//! fork), S3 (bidirectional folder sync through a real filesystem
//! watcher), S4 (preview mode), and S6 (GC sweep over a mix of
//! saved/unsaved/expired archives). Coalescing (invariant 1), idempotent
//! configure (invariant 2) and the crawler's checkpoint-reset invariant
//! (5) already have direct unit coverage inside `registry/mod.rs` and
//! `crawler/mod.rs`; these tests instead exercise the paths that only
//! show up when several subsystems run together against a real
//! filesystem.

use archivist::archive_fs::LiveArchiveFs;
use archivist::capabilities::ArchiveFs;
use archivist::context::RuntimeContext;
use archivist::key::KeyPair;
use archivist::registry::Checkout;
use archivist::types::{ArchiveMeta, Manifest, UserSettings};
use archivist::ArchiveLog;
use std::sync::Arc;
use std::time::Duration;

fn test_config(dir: &std::path::Path) -> archivist::config::RuntimeConfig {
	archivist::config::RuntimeConfig {
		dat_path: dir.to_path_buf(),
		sync_debounce: Duration::from_millis(30),
		..Default::default()
	}
}

/// S1. Create archive with manifest `{title: "src"}`, write 3 files, fork
/// into a new archive overriding `{title: "dst", author: "alice"}` while
/// preserving `{web_root, fallback_page, links}`; the fork carries every
/// src path except `/.dat`, `/.git`, `/dat.json`, and gets a defaulted
/// `.datignore` since src never wrote one.
#[tokio::test]
async fn s1_create_and_fork() {
	let src_kp = KeyPair::generate();
	let src_log = Arc::new(ArchiveLog::new_owned(src_kp));
	let src_fs = LiveArchiveFs::head(Arc::clone(&src_log));

	let src_manifest = Manifest {
		title: "src".to_string(),
		web_root: Some("/public".to_string()),
		fallback_page: Some("/index.html".to_string()),
		links: Some(serde_json::json!({"home": "/"})),
		..Default::default()
	};
	src_fs.write_manifest(&src_manifest).await.unwrap();
	src_fs.write_file("/a.txt", b"a").await.unwrap();
	src_fs.write_file("/b.txt", b"b").await.unwrap();
	src_fs.write_file("/dir/c.txt", b"c").await.unwrap();

	let dst_kp = KeyPair::generate();
	let dst_log = Arc::new(ArchiveLog::new_owned(dst_kp));
	let dst_fs = LiveArchiveFs::head(Arc::clone(&dst_log));

	let dst_manifest = Manifest {
		title: "dst".to_string(),
		author: Some("alice".to_string()),
		web_root: src_manifest.web_root.clone(),
		fallback_page: src_manifest.fallback_page.clone(),
		links: src_manifest.links.clone(),
		..Default::default()
	};
	dst_fs.write_manifest(&dst_manifest).await.unwrap();

	const EXCLUDED: [&str; 3] = ["/.dat", "/.git", "/dat.json"];
	for path in src_log.snapshot_paths(src_log.latest_version()) {
		if EXCLUDED.contains(&path.as_str()) {
			continue;
		}
		let contents = src_fs.read_file(&path).await.unwrap();
		dst_fs.write_file(&path, &contents).await.unwrap();
	}
	if dst_fs.read_file("/.datignore").await.is_err() {
		dst_fs.write_file("/.datignore", b"").await.unwrap();
	}

	let dst_manifest_read = dst_fs.read_manifest().await.unwrap();
	assert_eq!(dst_manifest_read.title, "dst");
	assert_eq!(dst_manifest_read.author.as_deref(), Some("alice"));
	assert_eq!(dst_manifest_read.web_root.as_deref(), Some("/public"));
	assert_eq!(dst_manifest_read.fallback_page.as_deref(), Some("/index.html"));
	assert!(dst_manifest_read.links.is_some());

	assert_eq!(dst_fs.read_file("/a.txt").await.unwrap(), b"a");
	assert_eq!(dst_fs.read_file("/b.txt").await.unwrap(), b"b");
	assert_eq!(dst_fs.read_file("/dir/c.txt").await.unwrap(), b"c");
	assert!(dst_fs.read_file("/.datignore").await.is_ok());
	for excluded in EXCLUDED {
		assert!(dst_fs.read_file(excluded).await.is_err(), "{excluded} must not carry over");
	}
}

/// S3. Bind folder `F` to writable archive `A` with `autoPublish=true`.
/// Create `F/a.txt` through the real `notify` watcher, wait past the
/// debounce window, then append `/b.txt` to the archive directly. After
/// `ensureSyncFinished`, both sides hold both files.
#[tokio::test]
async fn s3_bidirectional_sync_converges() {
	let dir = tempfile::tempdir().unwrap();
	let ctx = RuntimeContext::new(test_config(dir.path())).unwrap();

	let archive = ctx.registry.load_archive(None, None).await.unwrap();
	let log = ctx.registry.get_archive_log(archive.key).unwrap();

	let folder = tempfile::tempdir().unwrap();
	let settings = UserSettings {
		is_saved: true,
		local_sync_path: Some(folder.path().to_path_buf()),
		..Default::default()
	};
	ctx.registry.configure_archive(&archive, settings).await.unwrap();

	tokio::fs::write(folder.path().join("a.txt"), b"from folder").await.unwrap();
	tokio::time::sleep(Duration::from_millis(200)).await;

	LiveArchiveFs::head(Arc::clone(&log)).write_file("/b.txt", b"from archive").await.unwrap();
	ctx.sync_engine.ensure_sync_finished(&archive.key.to_hex()).await;
	tokio::time::sleep(Duration::from_millis(200)).await;

	let folder_a = tokio::fs::read(folder.path().join("a.txt")).await.unwrap();
	assert_eq!(folder_a, b"from folder");
	let folder_b = tokio::fs::read(folder.path().join("b.txt")).await.unwrap();
	assert_eq!(folder_b, b"from archive");

	let archive_fs = LiveArchiveFs::head(Arc::clone(&log));
	assert_eq!(archive_fs.read_file("/a.txt").await.unwrap(), b"from folder");
	assert!(!folder.path().join(".git").exists());
}

/// S4. Bind `F` to `A` with `previewMode=true`; edit `F/a.txt` directly;
/// the archive stays unchanged until the user explicitly publishes, but
/// reading `A` through the `preview` checkout reflects `F`.
#[tokio::test]
async fn s4_preview_mode_isolates_archive_until_published() {
	let dir = tempfile::tempdir().unwrap();
	let ctx = RuntimeContext::new(test_config(dir.path())).unwrap();

	let archive = ctx.registry.load_archive(None, None).await.unwrap();
	let log = ctx.registry.get_archive_log(archive.key).unwrap();

	let folder = tempfile::tempdir().unwrap();
	let settings = UserSettings {
		is_saved: true,
		local_sync_path: Some(folder.path().to_path_buf()),
		preview_mode: true,
		..Default::default()
	};
	ctx.registry.configure_archive(&archive, settings).await.unwrap();
	assert_eq!(archive.sync_binding.lock().unwrap().as_ref().map(|b| b.auto_publish), Some(false));

	tokio::fs::write(folder.path().join("a.txt"), b"drafted in folder").await.unwrap();
	tokio::time::sleep(Duration::from_millis(200)).await;

	let archive_fs = LiveArchiveFs::head(Arc::clone(&log));
	assert!(archive_fs.read_file("/a.txt").await.is_err(), "preview edits must not auto-publish to the archive");

	let checkout = ctx.registry.get_archive_checkout(&archive, "preview").unwrap();
	let Checkout::Preview(preview_fs) = checkout else { panic!("expected a preview checkout") };
	assert_eq!(preview_fs.read_file("/a.txt").await.unwrap(), b"drafted in folder");
}

/// S6. Archives `X(isSaved=true, lastAccess=now)`, `Y(isSaved=false,
/// lastAccess=now-8d)`, `Z(isSaved=true, expiresAt=now-1s)`. After
/// `collect`: `Z.isSaved` is false, `Y` is gone from MetaStore, `X` is
/// untouched.
#[tokio::test]
async fn s6_gc_scenario() {
	let dir = tempfile::tempdir().unwrap();
	let ctx = RuntimeContext::new(test_config(dir.path())).unwrap();

	let now = archivist::types::now_ms();
	let week_and_a_bit_ago = now - Duration::from_secs(8 * 24 * 60 * 60).as_millis() as u64;

	let x = KeyPair::generate().public_key();
	ctx.meta_store
		.set_user_settings(x, UserSettings { is_saved: true, ..Default::default() })
		.await
		.unwrap();
	ctx.meta_store
		.set_meta(archive_meta(x, now, false))
		.await
		.unwrap();

	let y = KeyPair::generate().public_key();
	ctx.meta_store
		.set_user_settings(y, UserSettings { is_saved: false, ..Default::default() })
		.await
		.unwrap();
	ctx.meta_store
		.set_meta(archive_meta(y, week_and_a_bit_ago, false))
		.await
		.unwrap();

	let z = KeyPair::generate().public_key();
	ctx.meta_store
		.set_user_settings(z, UserSettings { is_saved: true, expires_at: now - 1000, ..Default::default() })
		.await
		.unwrap();
	ctx.meta_store.set_meta(archive_meta(z, now, false)).await.unwrap();

	ctx.gc.collect().await.unwrap();

	let x_settings = ctx.meta_store.get_user_settings(x).await.unwrap().unwrap();
	assert!(x_settings.is_saved, "X must survive untouched");

	let y_meta = ctx.meta_store.query().await.unwrap();
	assert!(!y_meta.iter().any(|m| m.key == y.to_hex()), "Y's on-disk meta must be removed");

	let z_settings = ctx.meta_store.get_user_settings(z).await.unwrap().unwrap();
	assert!(!z_settings.is_saved, "Z must be expired, not deleted");
}

fn archive_meta(key: archivist::Key, last_access: u64, is_owner: bool) -> ArchiveMeta {
	ArchiveMeta {
		key: key.to_hex(),
		title: String::new(),
		description: String::new(),
		kind: vec![],
		author: None,
		fork_of: None,
		mtime: last_access,
		size: 0,
		is_owner,
		last_access_time: last_access,
		last_library_access_time: last_access,
	}
}

// vim: ts=4
