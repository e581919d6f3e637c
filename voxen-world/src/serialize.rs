//! The on-disk block blob codec.
//!
//! Layout: `[version:u8][flags:u8][content_width:u16]` followed by a
//! length-prefixed zlib stream holding the node planes
//! (`content_lo`, `param1`, `param2`, and `content_hi` when any id exceeds
//! one byte), then the node-metadata table, the static-object list, a
//! timestamp, the name↔id table used to remap contents on load, and the
//! node-timer list. All integers are big-endian.
//!
//! Version 1 blobs predate the timer list and are still readable; the
//! serializer always emits the current version.

use std::collections::BTreeMap;

use log::warn;
use voxen_core::{BlockNodes, BlockPos, ContentId, MapNode, NodeIndex, NodeRegistry};

use crate::map_block::{MapBlock, NodeMetadata, NodeTimer, StaticObject};

/// Current blob version; what `serialize_block` emits.
pub const SER_VERSION: u8 = 2;
/// Oldest blob version `deserialize_block` accepts.
pub const SER_VERSION_MIN_READ: u8 = 1;

const FLAG_UNDERGROUND: u8 = 0x01;
const FLAG_DAY_NIGHT_DIFFERS: u8 = 0x02;
const FLAG_GENERATED: u8 = 0x04;
const FLAG_LIGHTING_COMPLETE: u8 = 0x08;

const NODE_COUNT: usize = BlockPos::NODE_COUNT as usize;

/// Codec failures.
#[derive(thiserror::Error, Debug)]
pub enum SerializeError {
    /// The input ended before the structure was complete.
    #[error("block blob is truncated")]
    Truncated,
    /// The version byte is outside the readable range.
    #[error("unsupported block blob version {0}")]
    UnsupportedVersion(u8),
    /// A structural invariant of the blob is violated.
    #[error("corrupt block blob: {0}")]
    Corrupt(&'static str),
    /// The zlib stream could not be inflated.
    #[error("block blob decompression failed: {0}")]
    Decompression(String),
    /// Dummy blocks carry no node data and cannot be serialized.
    #[error("attempted to serialize a dummy block")]
    DummyBlock,
}

// --- primitive writers -------------------------------------------------

struct BlobWriter {
    out: Vec<u8>,
}

impl BlobWriter {
    fn new(capacity: usize) -> Self {
        Self {
            out: Vec::with_capacity(capacity),
        }
    }

    fn u8(&mut self, value: u8) {
        self.out.push(value);
    }

    fn u16(&mut self, value: u16) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn i32(&mut self, value: i32) {
        self.out.extend_from_slice(&value.to_be_bytes());
    }

    fn bytes(&mut self, value: &[u8]) {
        self.out.extend_from_slice(value);
    }

    /// Writes a u16 length prefix followed by the bytes.
    fn short_string(&mut self, value: &[u8]) -> Result<(), SerializeError> {
        let len =
            u16::try_from(value.len()).map_err(|_| SerializeError::Corrupt("string too long"))?;
        self.u16(len);
        self.bytes(value);
        Ok(())
    }
}

// --- primitive reader --------------------------------------------------

struct BlobReader<'blob> {
    input: &'blob [u8],
    pos: usize,
}

impl<'blob> BlobReader<'blob> {
    fn new(input: &'blob [u8]) -> Self {
        Self { input, pos: 0 }
    }

    fn take(&mut self, count: usize) -> Result<&'blob [u8], SerializeError> {
        let end = self
            .pos
            .checked_add(count)
            .ok_or(SerializeError::Truncated)?;
        let chunk = self
            .input
            .get(self.pos..end)
            .ok_or(SerializeError::Truncated)?;
        self.pos = end;
        Ok(chunk)
    }

    fn u8(&mut self) -> Result<u8, SerializeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, SerializeError> {
        let chunk = self.take(2)?;
        Ok(u16::from_be_bytes([chunk[0], chunk[1]]))
    }

    fn u32(&mut self) -> Result<u32, SerializeError> {
        let chunk = self.take(4)?;
        Ok(u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
    }

    fn i32(&mut self) -> Result<i32, SerializeError> {
        self.u32().map(|value| value as i32)
    }

    fn short_string(&mut self) -> Result<&'blob [u8], SerializeError> {
        let len = self.u16()?;
        self.take(usize::from(len))
    }
}

fn zlib_level(compression_level: i8) -> u8 {
    // -1 selects the library default; everything else is clamped into the
    // range miniz understands
    if compression_level < 0 {
        6
    } else {
        #[expect(clippy::cast_sign_loss, reason = "negative case handled above")]
        {
            (compression_level as u8).min(9)
        }
    }
}

// --- serialization -----------------------------------------------------

/// Serializes a loaded block into its durable blob form.
///
/// # Errors
/// [`SerializeError::DummyBlock`] for dummies; otherwise infallible.
pub fn serialize_block(
    block: &MapBlock,
    registry: &NodeRegistry,
    compression_level: i8,
) -> Result<Vec<u8>, SerializeError> {
    let nodes = block.nodes().ok_or(SerializeError::DummyBlock)?;

    let mut writer = BlobWriter::new(0x2000);
    writer.u8(SER_VERSION);

    let mut flags = 0_u8;
    if block.underground {
        flags |= FLAG_UNDERGROUND;
    }
    if block.day_night_differs_cached() {
        flags |= FLAG_DAY_NIGHT_DIFFERS;
    }
    if block.generated {
        flags |= FLAG_GENERATED;
    }
    if block.lighting_complete {
        flags |= FLAG_LIGHTING_COMPLETE;
    }
    writer.u8(flags);

    let wide = nodes.0.iter().any(|node| node.content.0 > 0xff);
    let content_width: u16 = if wide { 2 } else { 1 };
    writer.u16(content_width);

    // node planes, grouped per field so zlib sees long runs of similar bytes
    let mut planes = Vec::with_capacity(NODE_COUNT * (3 + usize::from(wide)));
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the low byte is wanted here"
    )]
    planes.extend(nodes.0.iter().map(|node| node.content.0 as u8));
    planes.extend(nodes.0.iter().map(|node| node.param1));
    planes.extend(nodes.0.iter().map(|node| node.param2));
    if wide {
        planes.extend(nodes.0.iter().map(|node| (node.content.0 >> 8) as u8));
    }
    let compressed =
        miniz_oxide::deflate::compress_to_vec_zlib(&planes, zlib_level(compression_level));
    let compressed_len =
        u32::try_from(compressed.len()).map_err(|_| SerializeError::Corrupt("zlib overflow"))?;
    writer.u32(compressed_len);
    writer.bytes(&compressed);

    serialize_metadata(&mut writer, block)?;
    serialize_static_objects(&mut writer, block)?;
    writer.u32(block.timestamp);
    serialize_name_id_table(&mut writer, nodes, registry)?;
    serialize_timers(&mut writer, block)?;

    Ok(writer.out)
}

fn serialize_metadata(writer: &mut BlobWriter, block: &MapBlock) -> Result<(), SerializeError> {
    let entries: Vec<_> = block.iter_metadata().collect();
    let count =
        u16::try_from(entries.len()).map_err(|_| SerializeError::Corrupt("metadata overflow"))?;
    writer.u16(count);
    for (index, meta) in entries {
        writer.u16(u16::from(index));
        let vars: Vec<_> = meta.iter().collect();
        let var_count =
            u16::try_from(vars.len()).map_err(|_| SerializeError::Corrupt("metadata overflow"))?;
        writer.u16(var_count);
        for (key, value) in vars {
            writer.short_string(key.as_bytes())?;
            let len = u32::try_from(value.len())
                .map_err(|_| SerializeError::Corrupt("metadata value too long"))?;
            writer.u32(len);
            writer.bytes(value.as_bytes());
        }
    }
    Ok(())
}

fn serialize_static_objects(
    writer: &mut BlobWriter,
    block: &MapBlock,
) -> Result<(), SerializeError> {
    writer.u8(0); // static-object list version
    let objects = block.static_objects();
    let count =
        u16::try_from(objects.len()).map_err(|_| SerializeError::Corrupt("object overflow"))?;
    writer.u16(count);
    for object in objects {
        writer.u8(object.type_id);
        // fixed-point node coordinates, millinode resolution
        for coord in [object.pos.x, object.pos.y, object.pos.z] {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "world coordinates fit the fixed-point range"
            )]
            writer.i32((coord * 1000.0) as i32);
        }
        writer.short_string(&object.data)?;
    }
    Ok(())
}

fn serialize_name_id_table(
    writer: &mut BlobWriter,
    nodes: &BlockNodes,
    registry: &NodeRegistry,
) -> Result<(), SerializeError> {
    let mut used: BTreeMap<u16, &str> = BTreeMap::new();
    for node in nodes.0.iter() {
        used.entry(node.content.0)
            .or_insert_with(|| registry.get_features(node.content).name.as_str());
    }
    writer.u8(0); // table version
    let count =
        u16::try_from(used.len()).map_err(|_| SerializeError::Corrupt("name table overflow"))?;
    writer.u16(count);
    for (id, name) in used {
        writer.u16(id);
        writer.short_string(name.as_bytes())?;
    }
    Ok(())
}

fn serialize_timers(writer: &mut BlobWriter, block: &MapBlock) -> Result<(), SerializeError> {
    let timers: Vec<_> = block.iter_node_timers().collect();
    let count =
        u16::try_from(timers.len()).map_err(|_| SerializeError::Corrupt("timer overflow"))?;
    writer.u16(count);
    for (index, timer) in timers {
        writer.u16(u16::from(index));
        #[expect(
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss,
            reason = "timer durations are short and non-negative"
        )]
        {
            writer.u32((f64::from(timer.timeout) * 1000.0) as u32);
            writer.u32((f64::from(timer.elapsed) * 1000.0) as u32);
        }
    }
    Ok(())
}

// --- deserialization ---------------------------------------------------

/// Rebuilds a block from its blob form, remapping content ids through the
/// embedded name table against the live registry. Names without a current
/// registration come back as `unknown`.
///
/// # Errors
/// Any [`SerializeError`] for truncated, corrupt or unsupported input.
pub fn deserialize_block(
    blob: &[u8],
    registry: &NodeRegistry,
) -> Result<MapBlock, SerializeError> {
    let mut reader = BlobReader::new(blob);

    let version = reader.u8()?;
    if !(SER_VERSION_MIN_READ..=SER_VERSION).contains(&version) {
        return Err(SerializeError::UnsupportedVersion(version));
    }
    let flags = reader.u8()?;
    let content_width = reader.u16()?;
    if !(content_width == 1 || content_width == 2) {
        return Err(SerializeError::Corrupt("bad content width"));
    }

    let compressed_len = reader.u32()? as usize;
    let compressed = reader.take(compressed_len)?;
    let planes = miniz_oxide::inflate::decompress_to_vec_zlib(compressed)
        .map_err(|error| SerializeError::Decompression(error.to_string()))?;
    let expected = NODE_COUNT * (2 + content_width as usize);
    if planes.len() != expected {
        return Err(SerializeError::Corrupt("bad node plane size"));
    }

    let mut nodes = BlockNodes::filled(MapNode::IGNORE);
    {
        let (lo, rest) = planes.split_at(NODE_COUNT);
        let (param1, rest) = rest.split_at(NODE_COUNT);
        let (param2, hi) = rest.split_at(NODE_COUNT);
        for index in 0..NODE_COUNT {
            #[expect(
                clippy::indexing_slicing,
                reason = "plane sizes were validated above"
            )]
            let raw = u16::from(lo[index])
                | if content_width == 2 {
                    u16::from(hi[index]) << 8
                } else {
                    0
                };
            #[expect(
                clippy::indexing_slicing,
                reason = "plane sizes were validated above"
            )]
            let node = MapNode {
                content: ContentId(raw),
                param1: param1[index],
                param2: param2[index],
            };
            nodes.0[index] = node;
        }
    }

    let metadata = deserialize_metadata(&mut reader)?;
    let static_objects = deserialize_static_objects(&mut reader)?;
    let timestamp = reader.u32()?;
    let id_map = deserialize_name_id_table(&mut reader, registry)?;
    let timers = if version >= 2 {
        deserialize_timers(&mut reader)?
    } else {
        Vec::new()
    };

    // remap every stored id into the current registry
    for node in nodes.0.iter_mut() {
        node.content = *id_map.get(&node.content.0).unwrap_or(&ContentId::UNKNOWN);
    }

    let mut block = MapBlock::with_nodes(nodes);
    block.underground = flags & FLAG_UNDERGROUND != 0;
    block.set_day_night_differs(flags & FLAG_DAY_NIGHT_DIFFERS != 0);
    block.generated = flags & FLAG_GENERATED != 0;
    block.lighting_complete = flags & FLAG_LIGHTING_COMPLETE != 0;
    block.timestamp = timestamp;
    for (index, meta) in metadata {
        block.set_metadata(index, meta);
    }
    block.set_static_objects(static_objects);
    for (index, timer) in timers {
        block.set_node_timer(index, timer);
    }
    // a freshly deserialized block is in sync with the database
    block.clear_modified();
    Ok(block)
}

fn deserialize_metadata(
    reader: &mut BlobReader<'_>,
) -> Result<Vec<(NodeIndex, NodeMetadata)>, SerializeError> {
    let count = reader.u16()?;
    let mut entries = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let index = NodeIndex::from(reader.u16()?);
        let var_count = reader.u16()?;
        let mut meta = NodeMetadata::new();
        for _ in 0..var_count {
            let key = reader.short_string()?;
            let key = std::str::from_utf8(key)
                .map_err(|_| SerializeError::Corrupt("metadata key not utf-8"))?
                .to_owned();
            let value_len = reader.u32()? as usize;
            let value = reader.take(value_len)?;
            let value = std::str::from_utf8(value)
                .map_err(|_| SerializeError::Corrupt("metadata value not utf-8"))?;
            meta.set(&key, value);
        }
        entries.push((index, meta));
    }
    Ok(entries)
}

fn deserialize_static_objects(
    reader: &mut BlobReader<'_>,
) -> Result<Vec<StaticObject>, SerializeError> {
    let list_version = reader.u8()?;
    if list_version != 0 {
        return Err(SerializeError::Corrupt("bad static-object list version"));
    }
    let count = reader.u16()?;
    let mut objects = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let type_id = reader.u8()?;
        #[expect(
            clippy::cast_precision_loss,
            reason = "fixed-point coordinates are well within f32 range"
        )]
        let pos = glam::Vec3::new(
            reader.i32()? as f32 / 1000.0,
            reader.i32()? as f32 / 1000.0,
            reader.i32()? as f32 / 1000.0,
        );
        let data = reader.short_string()?.to_vec();
        objects.push(StaticObject { type_id, pos, data });
    }
    Ok(objects)
}

fn deserialize_name_id_table(
    reader: &mut BlobReader<'_>,
    registry: &NodeRegistry,
) -> Result<BTreeMap<u16, ContentId>, SerializeError> {
    let table_version = reader.u8()?;
    if table_version != 0 {
        return Err(SerializeError::Corrupt("bad name table version"));
    }
    let count = reader.u16()?;
    let mut map = BTreeMap::new();
    for _ in 0..count {
        let stored_id = reader.u16()?;
        let name = reader.short_string()?;
        let name = std::str::from_utf8(name)
            .map_err(|_| SerializeError::Corrupt("node name not utf-8"))?;
        let id = registry.get_id(name).unwrap_or_else(|| {
            warn!("block references unregistered node `{name}`, substituting unknown");
            ContentId::UNKNOWN
        });
        map.insert(stored_id, id);
    }
    Ok(map)
}

fn deserialize_timers(
    reader: &mut BlobReader<'_>,
) -> Result<Vec<(NodeIndex, NodeTimer)>, SerializeError> {
    let count = reader.u16()?;
    let mut timers = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let index = NodeIndex::from(reader.u16()?);
        #[expect(
            clippy::cast_precision_loss,
            reason = "millisecond counts are far below f32 precision limits"
        )]
        let timer = NodeTimer {
            timeout: reader.u32()? as f32 / 1000.0,
            elapsed: reader.u32()? as f32 / 1000.0,
        };
        timers.push((index, timer));
    }
    Ok(timers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxen_core::{ContentFeatures, NodePos};

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry
            .register_node(ContentFeatures::simple("base:stone"))
            .unwrap();
        registry
            .register_node(ContentFeatures::simple("base:dirt"))
            .unwrap();
        registry.finalize().unwrap();
        registry
    }

    fn sample_block(registry: &NodeRegistry) -> MapBlock {
        let stone = registry.get_id("base:stone").unwrap();
        let mut block = MapBlock::new();
        for index in NodeIndex::iter_all() {
            block.set_no_check(index, MapNode::AIR);
        }
        block.set(NodePos::new(3, 0, 3).index(), MapNode::of(stone));
        block.generated = true;
        block.underground = true;
        block.timestamp = 12345;

        let mut meta = NodeMetadata::new();
        meta.set("note", "hello");
        block.set_metadata(NodePos::new(1, 2, 3).index(), meta);
        block.set_node_timer(
            NodePos::new(1, 2, 3).index(),
            NodeTimer {
                timeout: 5.0,
                elapsed: 0.0,
            },
        );
        block.add_static_object(StaticObject {
            type_id: 7,
            pos: glam::Vec3::new(1.5, 2.0, -3.25),
            data: b"payload".to_vec(),
        });
        block
    }

    #[test]
    fn round_trip_preserves_everything() {
        let registry = registry();
        let block = sample_block(&registry);
        let blob = serialize_block(&block, &registry, -1).unwrap();
        let restored = deserialize_block(&blob, &registry).unwrap();

        for index in NodeIndex::iter_all() {
            assert_eq!(restored.get(index), block.get(index));
        }
        assert_eq!(restored.generated, block.generated);
        assert_eq!(restored.underground, block.underground);
        assert_eq!(restored.timestamp, block.timestamp);

        let index = NodePos::new(1, 2, 3).index();
        assert_eq!(restored.metadata(index).unwrap().get("note"), Some("hello"));
        let timer = restored.node_timer(index).unwrap();
        assert!((timer.timeout - 5.0).abs() < 1e-3);
        assert!(timer.elapsed.abs() < 1e-3);
        assert_eq!(restored.static_objects(), block.static_objects());
    }

    #[test]
    fn unknown_names_degrade_to_unknown_content() {
        let registry = registry();
        let block = sample_block(&registry);
        let blob = serialize_block(&block, &registry, -1).unwrap();

        // a registry missing `base:stone` simulates a changed game
        let mut poor_registry = NodeRegistry::new();
        poor_registry
            .register_node(ContentFeatures::simple("base:dirt"))
            .unwrap();
        poor_registry.finalize().unwrap();

        let restored = deserialize_block(&blob, &poor_registry).unwrap();
        assert_eq!(
            restored.get(NodePos::new(3, 0, 3).index()).content,
            ContentId::UNKNOWN
        );
        assert_eq!(
            restored.get(NodePos::new(0, 0, 0).index()).content,
            ContentId::AIR
        );
    }

    #[test]
    fn truncated_input_is_an_error() {
        let registry = registry();
        let blob = serialize_block(&sample_block(&registry), &registry, -1).unwrap();
        for cut in [0, 1, 5, blob.len() / 2, blob.len() - 1] {
            assert!(
                matches!(
                    deserialize_block(&blob[..cut], &registry),
                    Err(SerializeError::Truncated | SerializeError::Corrupt(_))
                ),
                "cut at {cut} must fail"
            );
        }
    }

    #[test]
    fn wrong_version_is_an_error() {
        let registry = registry();
        let mut blob = serialize_block(&sample_block(&registry), &registry, -1).unwrap();
        blob[0] = 99;
        assert!(matches!(
            deserialize_block(&blob, &registry),
            Err(SerializeError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn dummy_blocks_refuse_to_serialize() {
        let registry = registry();
        assert!(matches!(
            serialize_block(&MapBlock::new_dummy(), &registry, -1),
            Err(SerializeError::DummyBlock)
        ));
    }

    #[test]
    fn random_blocks_round_trip() {
        use rand::Rng;
        let registry = registry();
        let stone = registry.get_id("base:stone").unwrap();
        let dirt = registry.get_id("base:dirt").unwrap();
        let mut rng = rand::rng();

        for _ in 0..20 {
            let mut block = MapBlock::new();
            for index in NodeIndex::iter_all() {
                let content = match rng.random_range(0..3) {
                    0 => ContentId::AIR,
                    1 => stone,
                    _ => dirt,
                };
                block.set_no_check(
                    index,
                    MapNode {
                        content,
                        param1: rng.random(),
                        param2: rng.random(),
                    },
                );
            }
            block.generated = rng.random();
            block.underground = rng.random();
            let level = rng.random_range(-1..=9);
            let blob = serialize_block(&block, &registry, level).unwrap();
            let restored = deserialize_block(&blob, &registry).unwrap();
            for index in NodeIndex::iter_all() {
                assert_eq!(restored.get(index), block.get(index));
            }
            assert_eq!(restored.generated, block.generated);
            assert_eq!(restored.underground, block.underground);
        }
    }

    #[test]
    fn wide_content_ids_use_a_fourth_plane() {
        let mut registry = NodeRegistry::new();
        // enough registrations to push an id past 255
        for number in 0..300 {
            registry
                .register_node(ContentFeatures::simple(&format!("filler:n{number:03}")))
                .unwrap();
        }
        registry.finalize().unwrap();
        let wide_id = registry.get_id("filler:n299").unwrap();
        assert!(wide_id.0 > 0xff, "test premise: id must exceed one byte");

        let mut block = MapBlock::new();
        for index in NodeIndex::iter_all() {
            block.set_no_check(index, MapNode::of(wide_id));
        }
        let blob = serialize_block(&block, &registry, -1).unwrap();
        let restored = deserialize_block(&blob, &registry).unwrap();
        assert_eq!(restored.get(NodeIndex::MIN).content, wide_id);
    }
}
