//! `subt` availability-subtree encoder.
//!
//! Three bit streams describe a fixed-depth window of the quadtree below a
//! root tile, in Morton visit order: which tiles the index holds, which of
//! those carry point content, and which boundary-layer tiles root a
//! further subtree one level past the window. A streaming client reads
//! these to avoid requesting absent data.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use super::pad_json;
use crate::bitvec::BitVec;
use crate::error::Result;
use crate::qtree::QuadTree;
use crate::tiling::TileAddr;

pub const SUBTREE_MAGIC: &[u8; 4] = b"subt";

const VERSION: u32 = 1;
const HEADER_LEN: usize = 24;

#[derive(Serialize)]
struct SubtreeDescriptor {
    buffers: Vec<BufferDescriptor>,
    #[serde(rename = "bufferViews")]
    buffer_views: Vec<BufferViewDescriptor>,
    #[serde(rename = "tileAvailability")]
    tile_availability: Availability,
    #[serde(rename = "contentAvailability")]
    content_availability: Vec<Availability>,
    #[serde(rename = "childSubtreeAvailability")]
    child_subtree_availability: Availability,
}

#[derive(Serialize)]
struct BufferDescriptor {
    #[serde(rename = "byteLength")]
    byte_length: usize,
}

#[derive(Serialize)]
struct BufferViewDescriptor {
    buffer: usize,
    #[serde(rename = "byteOffset")]
    byte_offset: usize,
    #[serde(rename = "byteLength")]
    byte_length: usize,
}

#[derive(Serialize)]
struct Availability {
    bitstream: usize,
    #[serde(rename = "availableCount")]
    available_count: usize,
}

/// Encode the availability subtree rooted at `root`, covering `depth`
/// levels (`root.z` through `root.z + depth - 1`); the child-subtree
/// stream describes the boundary layer at `root.z + depth`.
pub fn encode_subtree(tree: &QuadTree, root: TileAddr, depth: u8) -> Result<Bytes> {
    let mut tile_bits = BitVec::new();
    let mut tile_count = 0;
    let mut content_bits = BitVec::new();
    let mut content_count = 0;

    tree.traverse_z_order(root, depth, |view| {
        let available = view.is_available();
        let content = view.has_content();

        tile_bits.push(available);
        content_bits.push(content);

        tile_count += usize::from(available);
        content_count += usize::from(content);
    });

    let mut subtree_bits = BitVec::new();
    let mut subtree_count = 0;
    let boundary = root.z + depth;

    tree.traverse_z_order(root, depth + 1, |view| {
        if view.addr.z == boundary {
            let available = view.is_available();
            subtree_bits.push(available);
            subtree_count += usize::from(available);
        }
    });

    let sections = [
        tile_bits.as_bytes(),
        content_bits.as_bytes(),
        subtree_bits.as_bytes(),
    ];
    let mut buffer_views = Vec::with_capacity(sections.len());
    let mut offset = 0;
    for section in sections {
        buffer_views.push(BufferViewDescriptor {
            buffer: 0,
            byte_offset: offset,
            byte_length: section.len(),
        });
        offset += section.len();
    }
    let binary_length = offset;

    let descriptor = SubtreeDescriptor {
        buffers: vec![BufferDescriptor {
            byte_length: binary_length,
        }],
        buffer_views,
        tile_availability: Availability {
            bitstream: 0,
            available_count: tile_count,
        },
        content_availability: vec![Availability {
            bitstream: 1,
            available_count: content_count,
        }],
        child_subtree_availability: Availability {
            bitstream: 2,
            available_count: subtree_count,
        },
    };
    let json = pad_json(serde_json::to_string(&descriptor)?, 8);

    // Binary section padded with zeros onto an 8-byte boundary; header
    // lengths count the unpadded stream bytes.
    let tail_pad = 8 - binary_length % 8;
    let total = HEADER_LEN + json.len() + binary_length + tail_pad;

    let mut buf = BytesMut::with_capacity(total);
    buf.put_slice(SUBTREE_MAGIC);
    buf.put_u32_le(VERSION);
    buf.put_u64_le(json.len() as u64);
    buf.put_u64_le(binary_length as u64);

    buf.put_slice(json.as_bytes());
    for section in sections {
        buf.put_slice(section);
    }
    buf.put_bytes(0, tail_pad);

    Ok(buf.freeze())
}
