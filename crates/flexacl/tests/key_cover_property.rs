//! Property tests for flex key compilation
//!
//! Covers computed by `FlexKeyCompiler` are checked against an exhaustive
//! search over every block subset of small random catalogs.

use std::collections::BTreeSet;

use flexacl::{BasicKey, ErrorKind, FlexKeyCompiler, KeyBlock, KeyBlockCatalog, KeyBlockId};
use proptest::prelude::*;

const POOL: [BasicKey; 6] = [
    BasicKey::SrcIp,
    BasicKey::DstIp,
    BasicKey::IpProto,
    BasicKey::L4SrcPort,
    BasicKey::L4DstPort,
    BasicKey::VlanId,
];

fn catalog_strategy() -> impl Strategy<Value = KeyBlockCatalog> {
    let block = (
        prop::collection::btree_set(0usize..POOL.len(), 1..4),
        prop::collection::btree_set(0u16..6, 0..2),
    );
    prop::collection::vec(block, 2..=6).prop_map(|specs| {
        let count = specs.len() as u16;
        let blocks = specs.into_iter().enumerate().map(|(i, (fields, exclusions))| {
            let id = i as u16;
            KeyBlock::new(id, format!("B{}", id), fields.into_iter().map(|f| POOL[f]))
                .with_exclusions(exclusions.into_iter().filter(move |e| *e < count && *e != id))
        });
        KeyBlockCatalog::new(blocks).unwrap()
    })
}

fn fields_strategy() -> impl Strategy<Value = BTreeSet<BasicKey>> {
    prop::collection::btree_set(0usize..POOL.len(), 1..5)
        .prop_map(|idx| idx.into_iter().map(|i| POOL[i]).collect())
}

fn is_valid_cover(catalog: &KeyBlockCatalog, fields: &BTreeSet<BasicKey>, combo: &[KeyBlockId]) -> bool {
    let compatible = combo.iter().enumerate().all(|(i, a)| {
        combo[i + 1..]
            .iter()
            .all(|b| !catalog.are_exclusive(*a, *b))
    });
    compatible && fields.is_subset(&catalog.fields_of(combo))
}

/// Smallest valid cover size, optionally requiring `first` in the cover.
fn brute_force_min(
    catalog: &KeyBlockCatalog,
    fields: &BTreeSet<BasicKey>,
    first: Option<KeyBlockId>,
) -> Option<usize> {
    let ids: Vec<KeyBlockId> = catalog.blocks().map(|b| b.id).collect();
    (0u32..1 << ids.len())
        .filter_map(|mask| {
            let combo: Vec<KeyBlockId> = ids
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, id)| *id)
                .collect();
            let has_first = first.map_or(true, |f| combo.contains(&f));
            (has_first && is_valid_cover(catalog, fields, &combo)).then_some(combo.len())
        })
        .min()
}

proptest! {
    #[test]
    fn test_cover_is_minimal(catalog in catalog_strategy(), fields in fields_strategy()) {
        prop_assume!(fields.iter().all(|f| catalog.exposes(*f)));
        let compiler = FlexKeyCompiler::new(&catalog, catalog.len());

        match (compiler.compile(&fields), brute_force_min(&catalog, &fields, None)) {
            (Ok(blocks), Some(min)) => {
                prop_assert!(is_valid_cover(&catalog, &fields, &blocks));
                prop_assert_eq!(blocks.len(), min);
                prop_assert!(blocks.windows(2).all(|w| w[0] < w[1]));
            }
            (Err(err), None) => prop_assert_eq!(err.kind(), ErrorKind::ResourceExhausted),
            (result, min) => prop_assert!(false, "compile {:?} vs brute force {:?}", result, min),
        }
    }

    #[test]
    fn test_forced_first_cover_is_minimal(
        catalog in catalog_strategy(),
        fields in fields_strategy(),
        first in 0u16..6,
    ) {
        prop_assume!(fields.iter().all(|f| catalog.exposes(*f)));
        let first = KeyBlockId(first);
        prop_assume!(catalog.get(first).is_some());
        let compiler = FlexKeyCompiler::new(&catalog, catalog.len());

        match (
            compiler.compile_with_first(&fields, first),
            brute_force_min(&catalog, &fields, Some(first)),
        ) {
            (Ok(blocks), Some(min)) => {
                prop_assert_eq!(blocks.first(), Some(&first));
                prop_assert!(is_valid_cover(&catalog, &fields, &blocks));
                prop_assert_eq!(blocks.len(), min);
            }
            (Err(err), None) => prop_assert_eq!(err.kind(), ErrorKind::ResourceExhausted),
            (result, min) => prop_assert!(false, "compile {:?} vs brute force {:?}", result, min),
        }
    }

    #[test]
    fn test_block_budget_is_respected(
        catalog in catalog_strategy(),
        fields in fields_strategy(),
        budget in 1usize..4,
    ) {
        prop_assume!(fields.iter().all(|f| catalog.exposes(*f)));
        let compiler = FlexKeyCompiler::new(&catalog, budget);
        match brute_force_min(&catalog, &fields, None) {
            Some(min) if min <= budget => {
                prop_assert_eq!(compiler.compile(&fields).unwrap().len(), min);
            }
            _ => {
                let err = compiler.compile(&fields).unwrap_err();
                prop_assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
            }
        }
    }
}

#[test]
fn test_builtin_cover_prefers_wide_blocks() {
    let catalog = KeyBlockCatalog::builtin();
    let compiler = FlexKeyCompiler::new(&catalog, 6);
    let fields: BTreeSet<BasicKey> = [BasicKey::SrcIp, BasicKey::DstIp, BasicKey::L4DstPort]
        .into_iter()
        .collect();
    let blocks = compiler.compile(&fields).unwrap();
    assert_eq!(blocks, vec![KeyBlockId(3), KeyBlockId(6)]);
}
