// SPDX-FileCopyrightText: 2026 Weft Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Property tests for merge determinism.

use std::sync::Arc;

use proptest::prelude::*;

use weft_core::SegmentStore;
use weft_core::types::GroupKey;
use weft_test_utils::MemoryStore;
use weft_test_utils::segments::segment;

use crate::engine::ReassemblyEngine;

/// Deliveries of a 5-part group: every index at least once, up to three
/// redundant duplicates, in arbitrary order.
fn delivery_orders() -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::vec(1u32..=5, 0..4)
        .prop_map(|extras| {
            let mut order: Vec<u32> = (1..=5).collect();
            order.extend(extras);
            order
        })
        .prop_shuffle()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn merged_body_is_delivery_order_independent(order in delivery_orders()) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async move {
            let store = Arc::new(MemoryStore::new());
            let engine = ReassemblyEngine::new(store.clone() as Arc<dyn SegmentStore>);

            for index in order {
                engine
                    .ingest(segment("5000123", 9, 3, index, 5, &format!("<{index}>")))
                    .await
                    .unwrap();
            }

            let key = GroupKey {
                sender: "5000123".to_string(),
                logical_id: 9,
                reference: 3,
            };
            let merged = store
                .get_merged(&key)
                .await
                .unwrap()
                .expect("all parts were delivered");
            prop_assert_eq!(merged.body, "<1><2><3><4><5>");
            prop_assert_eq!(store.merged_count().await, 1);
            Ok(())
        })?;
    }
}
