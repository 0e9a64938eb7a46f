use proptest::prelude::*;
use protocol::{
    AddEntity, Attribute, AttributeMap, BinaryCursor, EntityDataMap, EntityDataValue, EntityLink,
    GamePacket, ProtocolRegistry, ProtocolVersion, Rotation, UpdateBlock, Vector3, BlockPosition,
};

#[derive(Clone, Debug)]
enum Op {
    U8(u8),
    Bool(bool),
    I16(i16),
    I32(i32),
    I32Be(i32),
    I64(i64),
    F32(f32),
    UVar32(u32),
    Var32(i32),
    UVar64(u64),
    Var64(i64),
    Str(String),
    Bytes(Vec<u8>),
}

fn finite() -> impl Strategy<Value = f32> {
    -1.0e6f32..1.0e6f32
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<u8>().prop_map(Op::U8),
        any::<bool>().prop_map(Op::Bool),
        any::<i16>().prop_map(Op::I16),
        any::<i32>().prop_map(Op::I32),
        any::<i32>().prop_map(Op::I32Be),
        any::<i64>().prop_map(Op::I64),
        finite().prop_map(Op::F32),
        any::<u32>().prop_map(Op::UVar32),
        any::<i32>().prop_map(Op::Var32),
        any::<u64>().prop_map(Op::UVar64),
        any::<i64>().prop_map(Op::Var64),
        ".{0,40}".prop_map(Op::Str),
        prop::collection::vec(any::<u8>(), 0..200).prop_map(Op::Bytes),
    ]
}

fn vector() -> impl Strategy<Value = Vector3> {
    (finite(), finite(), finite()).prop_map(|(x, y, z)| Vector3::new(x, y, z))
}

fn entity_value() -> impl Strategy<Value = EntityDataValue> {
    prop_oneof![
        any::<i8>().prop_map(EntityDataValue::Byte),
        any::<i16>().prop_map(EntityDataValue::Short),
        any::<i32>().prop_map(EntityDataValue::Int),
        finite().prop_map(EntityDataValue::Float),
        "[a-zA-Z0-9 ]{0,16}".prop_map(EntityDataValue::String),
        (any::<i32>(), any::<i32>(), any::<i32>())
            .prop_map(|(x, y, z)| EntityDataValue::BlockPosition(x, y, z)),
        any::<i64>().prop_map(EntityDataValue::Long),
        vector().prop_map(EntityDataValue::Vector),
    ]
}

fn attributes() -> impl Strategy<Value = AttributeMap> {
    prop::collection::btree_map(
        "minecraft:[a-z_]{1,20}",
        (finite(), finite(), finite(), finite())
            .prop_map(|(min, max, value, default)| Attribute::new(min, max, value, default)),
        0..64,
    )
}

fn entity_data() -> impl Strategy<Value = EntityDataMap> {
    prop::collection::btree_map(0u32..128, entity_value(), 0..64)
}

fn rotation() -> impl Strategy<Value = Rotation> {
    prop_oneof![
        (finite(), finite()).prop_map(|(yaw, pitch)| Rotation::new(yaw, pitch)),
        (finite(), finite(), finite())
            .prop_map(|(yaw, pitch, head)| Rotation::with_head_yaw(yaw, pitch, head)),
    ]
}

/// AddEntity values; `legacy` restricts them to what the oldest layout can carry.
fn add_entity(legacy: bool) -> impl Strategy<Value = AddEntity> {
    let rotation = if legacy {
        (finite(), finite())
            .prop_map(|(yaw, pitch)| Rotation::new(yaw, pitch))
            .boxed()
    } else {
        rotation().boxed()
    };
    let max_links = if legacy { 1 } else { 4 };
    (
        (any::<i64>(), any::<u64>(), any::<u32>()),
        (vector(), vector()),
        rotation,
        attributes(),
        entity_data(),
        prop::collection::vec(
            (any::<i64>(), any::<i64>(), any::<u8>()).prop_map(|(from, to, link_type)| {
                EntityLink {
                    from,
                    to,
                    link_type,
                }
            }),
            0..max_links,
        ),
    )
        .prop_map(
            |((unique_id, runtime_id, entity_type), (position, motion), rotation, attributes, entity_data, links)| {
                AddEntity {
                    unique_id,
                    runtime_id,
                    entity_type,
                    position,
                    motion,
                    rotation,
                    attributes,
                    entity_data,
                    links,
                }
            },
        )
}

proptest! {
    #[test]
    fn prop_cursor_ops_roundtrip(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut cursor = BinaryCursor::new();
        for op in &ops {
            match op {
                Op::U8(v) => cursor.put_u8(*v),
                Op::Bool(v) => cursor.put_bool(*v),
                Op::I16(v) => cursor.put_i16(*v),
                Op::I32(v) => cursor.put_i32(*v),
                Op::I32Be(v) => cursor.put_i32_be(*v),
                Op::I64(v) => cursor.put_i64(*v),
                Op::F32(v) => cursor.put_f32(*v),
                Op::UVar32(v) => cursor.put_uvarint32(*v),
                Op::Var32(v) => cursor.put_varint32(*v),
                Op::UVar64(v) => cursor.put_uvarint64(*v),
                Op::Var64(v) => cursor.put_varint64(*v),
                Op::Str(v) => cursor.put_string(v),
                Op::Bytes(v) => cursor.put_bytes(v),
            }
        }

        for op in &ops {
            match op {
                Op::U8(v) => prop_assert_eq!(cursor.get_u8().unwrap(), *v),
                Op::Bool(v) => prop_assert_eq!(cursor.get_bool().unwrap(), *v),
                Op::I16(v) => prop_assert_eq!(cursor.get_i16().unwrap(), *v),
                Op::I32(v) => prop_assert_eq!(cursor.get_i32().unwrap(), *v),
                Op::I32Be(v) => prop_assert_eq!(cursor.get_i32_be().unwrap(), *v),
                Op::I64(v) => prop_assert_eq!(cursor.get_i64().unwrap(), *v),
                Op::F32(v) => prop_assert_eq!(cursor.get_f32().unwrap(), *v),
                Op::UVar32(v) => prop_assert_eq!(cursor.get_uvarint32().unwrap(), *v),
                Op::Var32(v) => prop_assert_eq!(cursor.get_varint32().unwrap(), *v),
                Op::UVar64(v) => prop_assert_eq!(cursor.get_uvarint64().unwrap(), *v),
                Op::Var64(v) => prop_assert_eq!(cursor.get_varint64().unwrap(), *v),
                Op::Str(v) => prop_assert_eq!(&cursor.get_string().unwrap(), v),
                Op::Bytes(v) => prop_assert_eq!(&cursor.get_bytes().unwrap(), v),
            }
        }
        prop_assert!(cursor.is_exhausted());
        prop_assert!(cursor.get_u8().is_err());
    }

    #[test]
    fn prop_add_entity_roundtrip_full_layout(packet in add_entity(false)) {
        let protocols = ProtocolRegistry::with_defaults().unwrap();
        for version in protocols.versions() {
            let registry = protocols.registry(version).unwrap();
            let features = *registry.features();
            if !features.head_yaw || !features.entity_links {
                continue;
            }

            let message = GamePacket::AddEntity(packet.clone());
            let bytes = registry.encode(&message).unwrap();
            prop_assert_eq!(&bytes, &registry.encode(&message).unwrap());
            prop_assert_eq!(registry.decode(&bytes).unwrap(), message);
        }
    }

    #[test]
    fn prop_add_entity_roundtrip_legacy_layout(packet in add_entity(true)) {
        let protocols = ProtocolRegistry::with_defaults().unwrap();
        let registry = protocols.registry(ProtocolVersion::V160).unwrap();
        let message = GamePacket::AddEntity(packet);
        let bytes = registry.encode(&message).unwrap();
        prop_assert_eq!(registry.decode(&bytes).unwrap(), message);
    }

    #[test]
    fn prop_update_block_roundtrip_every_version(
        x in any::<i32>(),
        y in any::<u32>(),
        z in any::<i32>(),
        block_id in any::<u32>(),
        block_metadata in any::<u32>(),
        flags in any::<u32>(),
    ) {
        let protocols = ProtocolRegistry::with_defaults().unwrap();
        let packet = GamePacket::UpdateBlock(UpdateBlock {
            position: BlockPosition::new(x, y, z),
            block_id,
            block_metadata,
            flags,
        });
        for version in protocols.versions() {
            let registry = protocols.registry(version).unwrap();
            let bytes = registry.encode(&packet).unwrap();
            prop_assert_eq!(registry.decode(&bytes).unwrap(), packet.clone());
        }
    }

    #[test]
    fn prop_truncated_payload_never_decodes(packet in add_entity(false), cut in 1usize..16) {
        let protocols = ProtocolRegistry::with_defaults().unwrap();
        let registry = protocols.registry(ProtocolVersion::V220).unwrap();
        let bytes = registry.encode(&GamePacket::AddEntity(packet)).unwrap();
        let cut = cut.min(bytes.len() - 1);
        prop_assert!(registry.decode(&bytes[..bytes.len() - cut]).is_err());
    }
}
