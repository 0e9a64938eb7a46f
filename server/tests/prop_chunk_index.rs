use proptest::prelude::*;
use protocol::BlockPosition;
use server::chunk::ChunkIndex;
use server::dimension::chunks_around;

proptest! {
    #[test]
    fn pack_unpack_is_bijective(x in any::<i32>(), z in any::<i32>()) {
        prop_assert_eq!(ChunkIndex::pack(x, z).unpack(), (x, z));
    }

    #[test]
    fn distinct_coords_get_distinct_indexes(
        a in any::<(i32, i32)>(),
        b in any::<(i32, i32)>(),
    ) {
        prop_assume!(a != b);
        prop_assert_ne!(ChunkIndex::pack(a.0, a.1), ChunkIndex::pack(b.0, b.1));
    }

    #[test]
    fn block_lands_in_its_chunk(x in -1_000_000i32..1_000_000, y in 0u32..256, z in -1_000_000i32..1_000_000) {
        let (cx, cz) = ChunkIndex::of(&BlockPosition::new(x, y, z)).unpack();
        prop_assert!(cx * 16 <= x && x < cx * 16 + 16);
        prop_assert!(cz * 16 <= z && z < cz * 16 + 16);
    }

    #[test]
    fn square_around_center(cx in -1000i32..1000, cz in -1000i32..1000, radius in 0i32..6) {
        let chunks = chunks_around((cx, cz), radius);
        let side = (2 * radius + 1) as usize;
        prop_assert_eq!(chunks.len(), side * side);
        prop_assert!(chunks.contains(&ChunkIndex::pack(cx, cz)));
    }
}
