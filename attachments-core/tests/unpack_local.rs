use std::fs;
use std::io::{Cursor, Write};

use attachments_core::{Attachments, UnpackError};
use tempfile::tempdir;
use zip::write::SimpleFileOptions;

fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in files {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("start zip member");
        writer.write_all(content).expect("write zip member");
    }
    writer.finish().expect("finish zip").into_inner()
}

fn tar_gz_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        // Written raw so hostile names like `../x` survive into the archive.
        let raw = name.as_bytes();
        header.as_old_mut().name[..raw.len()].copy_from_slice(raw);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append(&header, *content).expect("append tar member");
    }
    let tar = builder.into_inner().expect("finish tar");
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar).expect("gzip tar");
    encoder.finish().expect("finish gzip")
}

#[tokio::test]
async fn nested_zip_in_directory_round_trips_inner_bytes() {
    let dir = tempdir().unwrap();
    let inner_bytes = b"hello from inner zip\n\x00\x01binary tail";
    let zip = zip_bytes(&[("inner/inner.txt", inner_bytes)]);
    fs::write(dir.path().join("outer.zip"), zip).unwrap();
    fs::write(dir.path().join("readme.md"), "# top").unwrap();

    let entries = Attachments::new()
        .unpack(dir.path().to_str().unwrap(), &[])
        .await
        .expect("unpack directory");

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["outer.zip/inner/inner.txt", "readme.md"]);
    assert_eq!(&entries[0].content[..], &inner_bytes[..]);
}

#[tokio::test]
async fn xlsx_in_directory_is_never_exploded() {
    let dir = tempdir().unwrap();
    // A real ZIP container with a spreadsheet-like layout.
    let xlsx = zip_bytes(&[
        ("[Content_Types].xml", b"<Types/>"),
        ("xl/workbook.xml", b"<workbook/>"),
    ]);
    fs::write(dir.path().join("table.xlsx"), &xlsx).unwrap();

    let entries = Attachments::new()
        .unpack(dir.path().to_str().unwrap(), &[])
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "table.xlsx");
    assert_eq!(&entries[0].content[..], &xlsx[..]);
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_file_is_skipped_and_walk_completes() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "a").unwrap();
    fs::write(dir.path().join("c.txt"), "c").unwrap();
    std::os::unix::fs::symlink(dir.path().join("missing-target"), dir.path().join("b.txt"))
        .unwrap();

    let entries = Attachments::new()
        .unpack(dir.path().to_str().unwrap(), &[])
        .await
        .expect("walk should tolerate unreadable files");

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["a.txt", "c.txt"]);
}

#[tokio::test]
async fn local_tar_gz_file_is_exploded_under_its_name() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("release.tgz");
    fs::write(&path, tar_gz_bytes(&[("pkg/a.txt", b"A"), ("../escape.txt", b"E")])).unwrap();

    let entries = Attachments::new()
        .unpack(path.to_str().unwrap(), &[])
        .await
        .unwrap();

    let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["release.tgz/pkg/a.txt", "release.tgz/escape.txt"]);
}

#[tokio::test]
async fn plain_local_file_is_a_single_entry() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("notes.txt");
    fs::write(&path, "some notes").unwrap();

    let entries = Attachments::new()
        .unpack(path.to_str().unwrap(), &[])
        .await
        .unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "notes.txt");
    assert_eq!(&entries[0].content[..], b"some notes");
}

#[tokio::test]
async fn corrupt_archive_fails_the_whole_input() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("good.txt"), "fine").unwrap();
    fs::write(dir.path().join("broken.zip"), b"PK\x03\x04garbage").unwrap();

    let err = Attachments::new()
        .unpack(dir.path().to_str().unwrap(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, UnpackError::ArchiveCorrupt { ref name, .. } if name == "broken.zip"));
}

#[tokio::test]
async fn missing_path_is_unsupported() {
    let err = Attachments::new()
        .unpack("/no/such/file/anywhere.txt", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, UnpackError::Unsupported { ref input } if input == "/no/such/file/anywhere.txt"));
}
