//! Shared fixtures: temporary repositories, random file content, and
//! byte-level pack/pack-index builders for the pack suites.

#![allow(dead_code)]

use assert_fs::TempDir;
use fake::Fake;
use fake::faker::lorem::en::{Word, Words};
use kit::{ObjectId, Repository};
use sha1::{Digest, Sha1};
use std::io::Write;
use std::path::Path;

/// A fresh initialized repository in a temp dir
pub fn init_repo() -> (TempDir, Repository) {
    let dir = TempDir::new().expect("temp dir");
    let repo = Repository::init(dir.path()).expect("init repository");
    (dir, repo)
}

/// Write a file under the repository root, creating parents
pub fn write_file(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dirs");
    }
    std::fs::write(path, content).expect("write file");
}

/// Random file name like `lorem.txt`
pub fn random_file_name() -> String {
    format!("{}.txt", Word().fake::<String>())
}

/// Random sentence-ish content
pub fn random_content() -> String {
    Words(5..10).fake::<Vec<String>>().join(" ")
}

pub fn zlib_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder =
        flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("compress");
    encoder.finish().expect("finish compression")
}

/// Pack entry type bits
pub const KIND_COMMIT: u8 = 1;
pub const KIND_TREE: u8 = 2;
pub const KIND_BLOB: u8 = 3;
pub const KIND_TAG: u8 = 4;
pub const KIND_OFS_DELTA: u8 = 6;
pub const KIND_REF_DELTA: u8 = 7;

/// Encode a pack entry header: `(more, type:3, size_lsb:4)` then
/// 7-bit continuations
pub fn encode_entry_header(kind_bits: u8, size: usize) -> Vec<u8> {
    let mut bytes = Vec::new();
    let mut first = (kind_bits << 4) | ((size & 0x0F) as u8);
    let mut remaining = size >> 4;
    if remaining > 0 {
        first |= 0x80;
    }
    bytes.push(first);

    while remaining > 0 {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining > 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
    }

    bytes
}

/// Encode an `ofs_delta` base distance (big-endian groups, +1 bias on
/// continuations)
pub fn encode_base_distance(mut distance: u64) -> Vec<u8> {
    let mut bytes = vec![(distance & 0x7F) as u8];
    distance >>= 7;
    while distance > 0 {
        distance -= 1;
        bytes.push(0x80 | (distance & 0x7F) as u8);
        distance >>= 7;
    }
    bytes.reverse();
    bytes
}

/// Encode a delta-header size (7-bit LSB-first)
pub fn encode_delta_varint(mut value: u64) -> Vec<u8> {
    let mut bytes = Vec::new();
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
        if value == 0 {
            return bytes;
        }
    }
}

/// A delta program that copies `copy_len` bytes from the base start,
/// then inserts `literal`
pub fn simple_delta(base_len: usize, copy_len: usize, literal: &[u8]) -> Vec<u8> {
    let mut program = encode_delta_varint(base_len as u64);
    program.extend(encode_delta_varint((copy_len + literal.len()) as u64));
    // copy: one offset byte (0), one size byte
    program.extend([0x80 | 0x01 | 0x10, 0, copy_len as u8]);
    // insert the literal
    program.push(literal.len() as u8);
    program.extend_from_slice(literal);
    program
}

/// Byte-level pack writer tracking entry offsets
pub struct PackBuilder {
    body: Vec<u8>,
    count: u32,
}

impl PackBuilder {
    pub fn new() -> Self {
        PackBuilder {
            body: Vec::new(),
            count: 0,
        }
    }

    fn push_entry(&mut self, header: Vec<u8>, payload: &[u8]) -> u64 {
        let offset = 12 + self.body.len() as u64;
        self.body.extend(header);
        self.body.extend(zlib_compress(payload));
        self.count += 1;
        offset
    }

    /// Append a non-delta entry, returning its offset
    pub fn add_object(&mut self, kind_bits: u8, payload: &[u8]) -> u64 {
        self.push_entry(encode_entry_header(kind_bits, payload.len()), payload)
    }

    /// Append an `ofs_delta` entry against an earlier offset
    pub fn add_ofs_delta(&mut self, base_offset: u64, delta: &[u8]) -> u64 {
        let offset = 12 + self.body.len() as u64;
        let mut header = encode_entry_header(KIND_OFS_DELTA, delta.len());
        header.extend(encode_base_distance(offset - base_offset));
        self.push_entry(header, delta)
    }

    /// Append a `ref_delta` entry against a named base
    pub fn add_ref_delta(&mut self, base: &ObjectId, delta: &[u8]) -> u64 {
        let mut header = encode_entry_header(KIND_REF_DELTA, delta.len());
        header.extend_from_slice(base.as_bytes());
        self.push_entry(header, delta)
    }

    /// Assemble header, entries, and SHA-1 trailer
    pub fn build(self) -> Vec<u8> {
        let mut pack = Vec::with_capacity(self.body.len() + 32);
        pack.extend_from_slice(b"PACK");
        pack.extend_from_slice(&2u32.to_be_bytes());
        pack.extend_from_slice(&self.count.to_be_bytes());
        pack.extend_from_slice(&self.body);

        let mut hasher = Sha1::new();
        hasher.update(&pack);
        let trailer = hasher.finalize();
        pack.extend_from_slice(&trailer);

        pack
    }
}

/// Build a v2 pack index over `(name, offset)` pairs, escaping
/// offsets that need 64 bits into the large-offset table
pub fn build_pack_index(objects: &[(ObjectId, u64)]) -> Vec<u8> {
    const LARGE_FLAG: u32 = 0x8000_0000;

    let mut objects: Vec<(ObjectId, u64)> = objects.to_vec();
    objects.sort_by(|a, b| a.0.cmp(&b.0));

    let mut counts = [0u32; 256];
    for (oid, _) in &objects {
        counts[oid.as_bytes()[0] as usize] += 1;
    }

    let mut fanout = Vec::with_capacity(1024);
    let mut running = 0u32;
    for count in counts {
        running += count;
        fanout.extend_from_slice(&running.to_be_bytes());
    }

    let mut names = Vec::new();
    let mut crcs = Vec::new();
    let mut offsets = Vec::new();
    let mut large = Vec::new();
    for (oid, offset) in &objects {
        names.extend_from_slice(oid.as_bytes());
        crcs.extend_from_slice(&0u32.to_be_bytes());
        if *offset >= LARGE_FLAG as u64 {
            let index = (large.len() / 8) as u32;
            offsets.extend_from_slice(&(LARGE_FLAG | index).to_be_bytes());
            large.extend_from_slice(&offset.to_be_bytes());
        } else {
            offsets.extend_from_slice(&(*offset as u32).to_be_bytes());
        }
    }

    let mut index = Vec::new();
    index.extend_from_slice(&[0xff, b't', b'O', b'c']);
    index.extend_from_slice(&2u32.to_be_bytes());
    index.extend_from_slice(&fanout);
    index.extend_from_slice(&names);
    index.extend_from_slice(&crcs);
    index.extend_from_slice(&offsets);
    index.extend_from_slice(&large);
    index.extend_from_slice(&[0u8; 40]); // pack + index checksums unused by the reader

    index
}

/// Install a pack and its index under `objects/pack`, returning the
/// pack path
pub fn install_pack(
    objects_dir: &Path,
    pack: &[u8],
    index: &[u8],
    stem: &str,
) -> std::path::PathBuf {
    let pack_dir = objects_dir.join("pack");
    std::fs::create_dir_all(&pack_dir).expect("create pack dir");

    let pack_path = pack_dir.join(format!("{stem}.pack"));
    std::fs::write(&pack_path, pack).expect("write pack");
    std::fs::write(pack_dir.join(format!("{stem}.idx")), index).expect("write idx");

    pack_path
}
