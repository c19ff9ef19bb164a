//! End-to-end scenarios from the overlay's testable-properties contract:
//! mkdir/stat, create/setattr, symlink/readlink, link/unlink, rename, and
//! rebuild-after-renumbering.

use metafs::vfs::{Attr, O_CREAT};
use metafs::MountContext;
use metafs_api::types::{Credentials, S_IFDIR, S_IFLNK, S_IFMT, S_IFREG};
use relative_path::RelativePath;
use std::fs;
use tempfile::tempdir;

const CALLER: Credentials = Credentials { uid: 1000, gid: 1000 };

fn mount_fresh(root: &std::path::Path) -> MountContext {
    fs::create_dir_all(root.join("data")).unwrap();
    MountContext::mount(root.join("data")).unwrap()
}

#[test]
fn scenario_1_mkdir_then_stat() {
    let dir = tempdir().unwrap();
    let mut mnt = mount_fresh(dir.path());

    let a = RelativePath::new("a");
    mnt.fs.mkdir(a, 0o750, CALLER).unwrap();

    let st = mnt.fs.stat(a, false).unwrap();
    assert_eq!(st.mode, S_IFDIR | 0o750);
    assert_eq!(st.uid, 1000);
    assert_eq!(st.gid, 1000);
}

#[test]
fn scenario_2_create_then_setattr() {
    let dir = tempdir().unwrap();
    let mut mnt = mount_fresh(dir.path());

    let a = RelativePath::new("a");
    mnt.fs.mkdir(a, 0o750, CALLER).unwrap();
    let f = RelativePath::new("a/f");
    mnt.fs.open(f, O_CREAT, 0o644, CALLER).unwrap();
    mnt.fs.setattr(f, Attr::Uid(42)).unwrap();

    let st = mnt.fs.stat(f, false).unwrap();
    assert_eq!(st.uid, 42);
    assert_eq!(st.mode, S_IFREG | 0o644);
}

#[test]
fn scenario_3_symlink_then_readlink() {
    let dir = tempdir().unwrap();
    let mut mnt = mount_fresh(dir.path());

    let a = RelativePath::new("a");
    mnt.fs.mkdir(a, 0o750, CALLER).unwrap();
    let link = RelativePath::new("a/l");
    mnt.fs.symlink("target", link, CALLER).unwrap();

    let content = mnt.fs.readlink(link, 64).unwrap();
    assert_eq!(content, b"target");
    assert_eq!(content.len(), 6);

    let st = mnt.fs.stat(link, false).unwrap();
    assert_eq!(st.mode & S_IFMT, S_IFLNK);
}

#[test]
fn scenario_4_link_then_unlink() {
    let dir = tempdir().unwrap();
    let mut mnt = mount_fresh(dir.path());

    let a = RelativePath::new("a");
    mnt.fs.mkdir(a, 0o750, CALLER).unwrap();
    let f = RelativePath::new("a/f");
    mnt.fs.open(f, O_CREAT, 0o644, CALLER).unwrap();
    mnt.fs.setattr(f, Attr::Uid(42)).unwrap();

    let g = RelativePath::new("a/g");
    mnt.fs.link(f, g).unwrap();
    mnt.fs.unlink(f).unwrap();

    let st_g = mnt.fs.stat(g, false).unwrap();
    assert_eq!(st_g.uid, 42);
    assert!(mnt.fs.stat(f, false).is_err());
}

#[test]
fn scenario_5_rename_clobbers_previous_record() {
    let dir = tempdir().unwrap();
    let mut mnt = mount_fresh(dir.path());

    let a = RelativePath::new("a");
    mnt.fs.mkdir(a, 0o750, CALLER).unwrap();

    let f = RelativePath::new("a/f");
    mnt.fs.open(f, O_CREAT, 0o644, CALLER).unwrap();
    mnt.fs.setattr(f, Attr::Uid(42)).unwrap();

    let h = RelativePath::new("a/h");
    mnt.fs.open(h, O_CREAT, 0o644, CALLER).unwrap();
    mnt.fs.setattr(h, Attr::Uid(7)).unwrap();

    mnt.fs.rename(f, h).unwrap();

    let st_h = mnt.fs.stat(h, false).unwrap();
    assert_eq!(st_h.uid, 42);
    assert!(mnt.fs.stat(f, false).is_err());
}

#[test]
fn setattr_preserves_type_bits() {
    let dir = tempdir().unwrap();
    let mut mnt = mount_fresh(dir.path());

    let a = RelativePath::new("a");
    mnt.fs.mkdir(a, 0o750, CALLER).unwrap();
    mnt.fs.setattr(a, Attr::Mode(0o700)).unwrap();

    let st = mnt.fs.stat(a, false).unwrap();
    assert_eq!(st.mode & S_IFMT, S_IFDIR);
    assert_eq!(st.mode & !S_IFMT, 0o700);
}

#[test]
fn remount_with_unchanged_inode_is_a_no_op() {
    let dir = tempdir().unwrap();
    {
        let mut mnt = mount_fresh(dir.path());
        let a = RelativePath::new("a");
        mnt.fs.mkdir(a, 0o750, CALLER).unwrap();
        mnt.unmount().unwrap();
    }

    let mut mnt = MountContext::mount(dir.path().join("data")).unwrap();
    let st = mnt.fs.stat(RelativePath::new("a"), false).unwrap();
    assert_eq!(st.mode, S_IFDIR | 0o750);
}

/// Recursively copy `src` into `dst` file by file, the way `fakefs_mount`'s
/// own comment describes a filesystem arriving after being "compressed,
/// transmitted, and uncompressed elsewhere": every object, and `meta.db`
/// itself, lands under a fresh host inode number.
fn copy_dir_recursive(src: &std::path::Path, dst: &std::path::Path) {
    fs::create_dir_all(dst).unwrap();
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let dst_path = dst.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path);
        } else {
            fs::copy(entry.path(), &dst_path).unwrap();
        }
    }
}

#[test]
fn scenario_6_rebuild_after_host_inode_renumbering() {
    let old_root = tempdir().unwrap();
    let new_root = tempdir().unwrap();

    {
        let mut mnt = mount_fresh(old_root.path());
        let a = RelativePath::new("a");
        mnt.fs.mkdir(a, 0o750, CALLER).unwrap();
        let f = RelativePath::new("a/f");
        mnt.fs.open(f, O_CREAT, 0o644, CALLER).unwrap();
        mnt.fs.setattr(f, Attr::Uid(42)).unwrap();
        let link = RelativePath::new("a/l");
        mnt.fs.symlink("target", link, CALLER).unwrap();
        mnt.unmount().unwrap();
    }

    // old_root is never reused past this point, so every inode under
    // new_root is guaranteed fresh relative to what the database recorded.
    copy_dir_recursive(old_root.path(), new_root.path());

    let mut mnt = MountContext::mount(new_root.path().join("data")).unwrap();

    let a = RelativePath::new("a");
    let st_a = mnt.fs.stat(a, false).unwrap();
    assert_eq!(st_a.mode, S_IFDIR | 0o750);

    let f = RelativePath::new("a/f");
    let st_f = mnt.fs.stat(f, false).unwrap();
    assert_eq!(st_f.uid, 42);
    assert_eq!(st_f.mode & S_IFMT, S_IFREG);

    let link = RelativePath::new("a/l");
    let st_link = mnt.fs.stat(link, false).unwrap();
    assert_eq!(st_link.mode & S_IFMT, S_IFLNK);
    assert_eq!(mnt.fs.readlink(link, 64).unwrap(), b"target");
}
