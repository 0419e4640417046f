//! Per topic-partition merge of delivery results

use super::message::{DeliveryMetadata, RecordMetadata};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Merge delivery results into one entry per topic-partition.
///
/// Each entry keeps the lowest non-null base offset seen for its
/// partition; a known offset is never replaced by an unknown one.
/// Output is ordered by topic, then partition.
pub fn aggregate<I>(deliveries: I) -> Vec<RecordMetadata>
where
    I: IntoIterator<Item = DeliveryMetadata>,
{
    let mut merged: BTreeMap<(String, i32), DeliveryMetadata> = BTreeMap::new();

    for delivery in deliveries {
        match merged.entry((delivery.topic.clone(), delivery.partition)) {
            Entry::Vacant(entry) => {
                entry.insert(delivery);
            }
            Entry::Occupied(mut entry) => {
                if supersedes(&delivery, entry.get()) {
                    entry.insert(delivery);
                }
            }
        }
    }

    merged.into_values().map(RecordMetadata::from).collect()
}

fn supersedes(candidate: &DeliveryMetadata, current: &DeliveryMetadata) -> bool {
    match (candidate.base_offset, current.base_offset) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(new), Some(old)) => new < old,
    }
}
