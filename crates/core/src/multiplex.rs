//! Content multiplexing
//!
//! Turns one fetched payload into a sequence of members. The branch is chosen
//! by sniffing the payload's bytes, never its name:
//! 1. tar (plain, gzip, bzip2 or xz compressed): one member per regular file
//! 2. zip, including self-extracting stubs: one member per non-directory entry
//! 3. anything else: a single unnamed member holding the whole payload
//!
//! Member names are `/`-prefixed; callers prepend their own origin label.

use std::io::{self, Read, Seek, SeekFrom};

use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use xz2::read::XzDecoder;

use crate::error::{Error, Result};

const TAR_BLOCK_LEN: usize = 512;
const USTAR_MAGIC_OFFSET: usize = 257;
const CHECKSUM_RANGE: std::ops::Range<usize> = 148..156;

const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];
const ZIP_END_RECORD: &[u8] = b"PK\x05\x06";
const ZIP_END_RECORD_LEN: u64 = 22;
/// End record plus the longest possible archive comment
const ZIP_TAIL_WINDOW: u64 = ZIP_END_RECORD_LEN + u16::MAX as u64;

/// One unit produced by the multiplexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// `/`-prefixed archive path, absent for an opaque blob
    pub name: Option<String>,
    pub content: Vec<u8>,
}

impl Member {
    /// Attach the member to its origin: `label` followed by the member path
    pub fn labelled(self, label: &str) -> (String, Vec<u8>) {
        let path = match self.name {
            Some(name) => format!("{label}{name}"),
            None => label.to_string(),
        };
        (path, self.content)
    }
}

/// Detected payload layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Tar,
    GzipTar,
    Bzip2Tar,
    XzTar,
    Zip,
    Blob,
}

/// Sniff the payload format, leaving the reader at its start
pub fn detect<R: Read + Seek>(reader: &mut R) -> Result<Format> {
    reader.seek(SeekFrom::Start(0))?;
    let mut head = [0u8; TAR_BLOCK_LEN];
    let n = read_up_to(reader, &mut head)?;
    reader.seek(SeekFrom::Start(0))?;
    let head = &head[..n];

    if is_tar_header(head) {
        return Ok(Format::Tar);
    }

    if let Some(format) = compressed_tar_candidate(head) {
        if decodes_to_tar(reader, format)? {
            return Ok(format);
        }
    }

    if is_zip_magic(head) || has_zip_end_record(reader)? {
        return Ok(Format::Zip);
    }

    Ok(Format::Blob)
}

fn compressed_tar_candidate(head: &[u8]) -> Option<Format> {
    if is_gzip_magic(head) {
        Some(Format::GzipTar)
    } else if is_bzip2_magic(head) {
        Some(Format::Bzip2Tar)
    } else if is_xz_magic(head) {
        Some(Format::XzTar)
    } else {
        None
    }
}

/// Decompress the first block and check it for a tar header
fn decodes_to_tar<R: Read + Seek>(reader: &mut R, format: Format) -> Result<bool> {
    let mut block = [0u8; TAR_BLOCK_LEN];
    let inflated = match format {
        Format::GzipTar => read_up_to(&mut GzDecoder::new(&mut *reader), &mut block),
        Format::Bzip2Tar => read_up_to(&mut BzDecoder::new(&mut *reader), &mut block),
        Format::XzTar => read_up_to(&mut XzDecoder::new(&mut *reader), &mut block),
        _ => Ok(0),
    };
    reader.seek(SeekFrom::Start(0))?;
    // A stream that fails to decompress is just not a tarball.
    Ok(is_tar_header(&block[..inflated.unwrap_or(0)]))
}

/// Look for a readable central directory behind leading bytes
///
/// Covers self-extracting archives and script stubs, where the local
/// header magic is not at offset 0.
fn has_zip_end_record<R: Read + Seek>(reader: &mut R) -> Result<bool> {
    let len = reader.seek(SeekFrom::End(0))?;
    if len < ZIP_END_RECORD_LEN {
        reader.seek(SeekFrom::Start(0))?;
        return Ok(false);
    }

    let window = len.min(ZIP_TAIL_WINDOW);
    reader.seek(SeekFrom::Start(len - window))?;
    let mut tail = Vec::with_capacity(window as usize);
    reader.by_ref().take(window).read_to_end(&mut tail)?;

    let found = tail
        .windows(ZIP_END_RECORD.len())
        .any(|w| w == ZIP_END_RECORD);
    // An empty archive behind foreign bytes is indistinguishable from noise.
    let readable = found
        && zip::ZipArchive::new(&mut *reader).is_ok_and(|archive| archive.len() > 0);

    reader.seek(SeekFrom::Start(0))?;
    Ok(readable)
}

/// Expand a payload, handing each member to `sink` in archive order
///
/// `sink` returns `false` to stop early. Archive errors surface as
/// [`Error::CorruptArchive`].
pub fn expand<R, F>(mut reader: R, mut sink: F) -> Result<()>
where
    R: Read + Seek,
    F: FnMut(Member) -> bool,
{
    match detect(&mut reader)? {
        Format::Tar => expand_tar(reader, sink),
        Format::GzipTar => expand_tar(GzDecoder::new(reader), sink),
        Format::Bzip2Tar => expand_tar(BzDecoder::new(reader), sink),
        Format::XzTar => expand_tar(XzDecoder::new(reader), sink),
        Format::Zip => expand_zip(reader, sink),
        Format::Blob => {
            let mut content = Vec::new();
            reader.read_to_end(&mut content)?;
            sink(Member {
                name: None,
                content,
            });
            Ok(())
        }
    }
}

/// Expand a payload into a lazy stream of members
///
/// Decoding runs on the blocking pool and hands members over one at a time;
/// dropping the stream stops the decoder at the next member boundary.
pub fn expand_stream<R>(reader: R) -> BoxStream<'static, Result<Member>>
where
    R: Read + Seek + Send + 'static,
{
    let (tx, rx) = mpsc::channel::<Result<Member>>(1);

    tokio::task::spawn_blocking(move || {
        let outcome = expand(reader, |member| tx.blocking_send(Ok(member)).is_ok());
        if let Err(e) = outcome {
            let _ = tx.blocking_send(Err(e));
        }
    });

    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    })
    .boxed()
}

fn expand_tar<R: Read, F: FnMut(Member) -> bool>(reader: R, mut sink: F) -> Result<()> {
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;

        // Only regular files; directories, links and devices are skipped.
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let name = entry.path().map_err(corrupt)?.to_string_lossy().into_owned();
        let size = entry.size();
        let mut content = Vec::with_capacity(size.min(1 << 20) as usize);
        entry.read_to_end(&mut content).map_err(corrupt)?;
        if content.len() as u64 != size {
            return Err(Error::CorruptArchive(format!(
                "{name}: member truncated at {} of {size} bytes",
                content.len()
            )));
        }

        if !sink(Member {
            name: Some(format!("/{name}")),
            content,
        }) {
            break;
        }
    }

    Ok(())
}

fn expand_zip<R: Read + Seek, F: FnMut(Member) -> bool>(reader: R, mut sink: F) -> Result<()> {
    let mut archive =
        zip::ZipArchive::new(reader).map_err(|e| Error::CorruptArchive(e.to_string()))?;

    for index in 0..archive.len() {
        let mut file = archive
            .by_index(index)
            .map_err(|e| Error::CorruptArchive(e.to_string()))?;

        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        let mut content = Vec::with_capacity(file.size().min(1 << 20) as usize);
        file.read_to_end(&mut content).map_err(corrupt)?;

        if !sink(Member {
            name: Some(format!("/{name}")),
            content,
        }) {
            break;
        }
    }

    Ok(())
}

fn corrupt(e: io::Error) -> Error {
    Error::CorruptArchive(e.to_string())
}

fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Check for a tar header block: `ustar` magic or a valid v7 checksum
pub fn is_tar_header(block: &[u8]) -> bool {
    if block.len() < TAR_BLOCK_LEN {
        return false;
    }
    if &block[USTAR_MAGIC_OFFSET..USTAR_MAGIC_OFFSET + 5] == b"ustar" {
        return true;
    }
    if block.iter().all(|&b| b == 0) {
        return false;
    }

    let expected: u32 = block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if CHECKSUM_RANGE.contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(b)
            }
        })
        .sum();

    parse_octal(&block[CHECKSUM_RANGE]) == Some(expected)
}

fn parse_octal(field: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(field).ok()?;
    let text = text.trim_matches(|c: char| c == '\0' || c == ' ');
    if text.is_empty() {
        return None;
    }
    u32::from_str_radix(text, 8).ok()
}

pub fn is_gzip_magic(head: &[u8]) -> bool {
    head.len() >= 2 && head[0] == 0x1f && head[1] == 0x8b
}

pub fn is_bzip2_magic(head: &[u8]) -> bool {
    head.starts_with(b"BZh")
}

pub fn is_xz_magic(head: &[u8]) -> bool {
    head.starts_with(XZ_MAGIC)
}

/// Local file header or empty-archive end record
pub fn is_zip_magic(head: &[u8]) -> bool {
    if head.len() < 4 || head[0] != b'P' || head[1] != b'K' {
        return false;
    }
    matches!((head[2], head[3]), (3, 4) | (5, 6))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::{Cursor, Write};

    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Build a tar with the given files and directories
    pub fn tar(files: &[(&str, &[u8])], dirs: &[&str]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for dir in dirs {
            let mut header = tar::Header::new_ustar();
            header.set_entry_type(tar::EntryType::Directory);
            header.set_path(dir).unwrap();
            header.set_size(0);
            header.set_mode(0o755);
            header.set_cksum();
            builder.append(&header, std::io::empty()).unwrap();
        }
        for (name, data) in files {
            let mut header = tar::Header::new_ustar();
            header.set_path(name).unwrap();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    pub fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    pub fn bzip2(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    pub fn xz(data: &[u8]) -> Vec<u8> {
        let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    /// Build a tar holding one regular file next to link and device members
    pub fn tar_with_specials(file: (&str, &[u8])) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut header = tar::Header::new_ustar();
        header.set_path(file.0).unwrap();
        header.set_size(file.1.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append(&header, file.1).unwrap();

        let specials = [
            ("soft", tar::EntryType::Symlink),
            ("hard", tar::EntryType::Link),
            ("tty0", tar::EntryType::Char),
            ("fifo", tar::EntryType::Fifo),
        ];
        for (name, kind) in specials {
            let mut header = tar::Header::new_ustar();
            header.set_entry_type(kind);
            header.set_path(name).unwrap();
            if matches!(kind, tar::EntryType::Symlink | tar::EntryType::Link) {
                header.set_link_name(file.0).unwrap();
            }
            header.set_size(0);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, std::io::empty()).unwrap();
        }

        builder.into_inner().unwrap()
    }

    /// Build a stored (uncompressed) zip
    pub fn zip(files: &[(&str, &[u8])], dirs: &[&str]) -> Vec<u8> {
        let options = || {
            zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored)
        };
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for dir in dirs {
            writer.add_directory(*dir, options()).unwrap();
        }
        for (name, data) in files {
            writer.start_file(*name, options()).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use futures::TryStreamExt;

    use super::fixtures;
    use super::*;

    fn collect(data: Vec<u8>) -> Result<Vec<Member>> {
        let mut members = Vec::new();
        expand(Cursor::new(data), |m| {
            members.push(m);
            true
        })?;
        Ok(members)
    }

    #[test]
    fn test_tar_yields_regular_files_only() {
        let data = fixtures::tar(
            &[("a.txt", b"alpha"), ("dir/b.txt", b"bravo")],
            &["dir/"],
        );
        let members = collect(data).unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name.as_deref(), Some("/a.txt"));
        assert_eq!(members[0].content, b"alpha");
        assert_eq!(members[1].name.as_deref(), Some("/dir/b.txt"));
        assert_eq!(members[1].content, b"bravo");
    }

    #[test]
    fn test_gzip_tar_is_expanded() {
        let data = fixtures::gzip(&fixtures::tar(&[("x/y.yaml", b"rule: 1")], &[]));
        assert_eq!(detect(&mut Cursor::new(&data)).unwrap(), Format::GzipTar);

        let members = collect(data).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name.as_deref(), Some("/x/y.yaml"));
        assert_eq!(members[0].content, b"rule: 1");
    }

    #[test]
    fn test_gzip_non_tar_is_blob() {
        let data = fixtures::gzip(b"just some compressed text");
        let members = collect(data.clone()).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name, None);
        assert_eq!(members[0].content, data);
    }

    #[test]
    fn test_zip_skips_directories() {
        let data = fixtures::zip(&[("docs/readme.md", b"# hi"), ("top.txt", b"t")], &["docs/"]);
        let members = collect(data).unwrap();

        assert_eq!(members.len(), 2);
        assert_eq!(members[0].name.as_deref(), Some("/docs/readme.md"));
        assert_eq!(members[0].content, b"# hi");
        assert_eq!(members[1].name.as_deref(), Some("/top.txt"));
    }

    #[test]
    fn test_blob_is_single_unnamed_member() {
        let data = b"plain text, no archive here".to_vec();
        let members = collect(data.clone()).unwrap();
        assert_eq!(
            members,
            vec![Member {
                name: None,
                content: data
            }]
        );
    }

    #[test]
    fn test_links_and_devices_are_skipped() {
        let data = fixtures::tar_with_specials(("bin/tool", b"ELF"));
        let members = collect(data).unwrap();

        assert_eq!(
            members,
            vec![Member {
                name: Some("/bin/tool".into()),
                content: b"ELF".to_vec(),
            }]
        );
    }

    #[test]
    fn test_bzip2_tar_is_expanded() {
        let data = fixtures::bzip2(&fixtures::tar(&[("a.txt", b"alpha")], &[]));
        assert_eq!(detect(&mut Cursor::new(&data)).unwrap(), Format::Bzip2Tar);

        let members = collect(data).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name.as_deref(), Some("/a.txt"));
        assert_eq!(members[0].content, b"alpha");
    }

    #[test]
    fn test_xz_tar_is_expanded() {
        let data = fixtures::xz(&fixtures::tar(&[("a.txt", b"alpha")], &["d/"]));
        assert_eq!(detect(&mut Cursor::new(&data)).unwrap(), Format::XzTar);

        let members = collect(data).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].name.as_deref(), Some("/a.txt"));
    }

    #[test]
    fn test_compressed_non_tar_is_blob() {
        for data in [
            fixtures::bzip2(b"just some text"),
            fixtures::xz(b"just some text"),
            fixtures::gzip(b"just some text"),
        ] {
            assert_eq!(detect(&mut Cursor::new(&data)).unwrap(), Format::Blob);
            let members = collect(data.clone()).unwrap();
            assert_eq!(members, vec![Member { name: None, content: data }]);
        }
    }

    #[test]
    fn test_zip_behind_script_stub() {
        let mut data = b"#!/bin/sh\nexit 0\n".to_vec();
        data.extend(fixtures::zip(&[("f.txt", b"payload")], &[]));
        assert_eq!(detect(&mut Cursor::new(&data)).unwrap(), Format::Zip);

        let members = collect(data).unwrap();
        assert_eq!(
            members,
            vec![Member {
                name: Some("/f.txt".into()),
                content: b"payload".to_vec(),
            }]
        );
    }

    #[test]
    fn test_stray_end_record_signature_is_blob() {
        let mut data = b"plain text mentioning ".to_vec();
        data.extend_from_slice(b"PK\x05\x06");
        // Two entries in a 16-byte directory at an offset past the end
        data.extend_from_slice(&[0, 0, 0, 0, 2, 0, 2, 0, 16, 0, 0, 0, 0xff, 0xff, 0, 0, 0, 0]);
        assert_eq!(detect(&mut Cursor::new(&data)).unwrap(), Format::Blob);
    }

    #[test]
    fn test_empty_payload_is_blob() {
        let members = collect(Vec::new()).unwrap();
        assert_eq!(members.len(), 1);
        assert!(members[0].content.is_empty());
    }

    #[test]
    fn test_name_does_not_matter() {
        // Same bytes, whatever the caller calls them.
        let data = fixtures::zip(&[("f", b"1")], &[]);
        assert_eq!(detect(&mut Cursor::new(&data)).unwrap(), Format::Zip);
    }

    #[test]
    fn test_corrupt_zip_is_reported() {
        let mut data = fixtures::zip(&[("f.txt", b"content")], &[]);
        data.truncate(20);
        let err = collect(data).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
    }

    #[test]
    fn test_corrupt_tar_is_reported() {
        let mut data = fixtures::tar(&[("f.txt", &[7u8; 2000])], &[]);
        data.truncate(TAR_BLOCK_LEN + 100);
        let err = collect(data).unwrap_err();
        assert!(matches!(err, Error::CorruptArchive(_)));
    }

    #[test]
    fn test_sink_can_stop_early() {
        let data = fixtures::tar(&[("1", b"a"), ("2", b"b"), ("3", b"c")], &[]);
        let mut seen = 0;
        expand(Cursor::new(data), |_| {
            seen += 1;
            seen < 2
        })
        .unwrap();
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_member_labelled() {
        let member = Member {
            name: Some("/a/b".into()),
            content: vec![1],
        };
        assert_eq!(member.labelled("https://host/x.tar").0, "https://host/x.tar/a/b");

        let blob = Member {
            name: None,
            content: vec![1],
        };
        assert_eq!(blob.labelled("README.md").0, "README.md");
    }

    #[test]
    fn test_magic_checks() {
        assert!(is_zip_magic(b"PK\x03\x04rest"));
        assert!(is_zip_magic(b"PK\x05\x06"));
        assert!(!is_zip_magic(b"PK"));
        assert!(is_gzip_magic(&[0x1f, 0x8b, 8]));
        assert!(is_bzip2_magic(b"BZh91AY&SY"));
        assert!(is_xz_magic(&[0xfd, b'7', b'z', b'X', b'Z', 0, 0, 4]));
        assert!(!is_xz_magic(b"7zXZ"));
        assert!(!is_tar_header(&[0u8; 512]));
        assert!(!is_tar_header(b"short"));
    }

    #[tokio::test]
    async fn test_expand_stream() {
        let data = fixtures::tar(&[("a", b"1"), ("b", b"2")], &[]);
        let members: Vec<Member> = expand_stream(Cursor::new(data)).try_collect().await.unwrap();
        assert_eq!(members.len(), 2);
        assert_eq!(members[1].name.as_deref(), Some("/b"));
    }

    #[tokio::test]
    async fn test_expand_stream_reports_corruption() {
        let mut data = fixtures::zip(&[("f.txt", b"content")], &[]);
        data.truncate(10);
        let result: Result<Vec<Member>> = expand_stream(Cursor::new(data)).try_collect().await;
        assert!(matches!(result, Err(Error::CorruptArchive(_))));
    }
}
