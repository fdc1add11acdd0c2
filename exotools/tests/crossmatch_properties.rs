//! Property tests for joins.

use exotools::crossmatch::{join, JoinKey, JoinOptions};
use exotools::table::CatalogTable;
use polars::prelude::{Column, NamedFrom};
use proptest::prelude::*;

fn table(keys: &[Option<i64>], value_column: &str) -> CatalogTable {
    let values: Vec<Option<i64>> = (0..keys.len() as i64).map(Some).collect();
    CatalogTable::new(vec![
        Column::new("tic_id".into(), keys.to_vec()),
        Column::new(value_column.into(), values),
    ])
    .unwrap()
}

fn ints(table: &CatalogTable, column: &str) -> Vec<Option<i64>> {
    table.rows().map(|row| row.i64(column)).collect()
}

fn keys() -> impl Strategy<Value = Vec<Option<i64>>> {
    prop::collection::vec(prop::option::weighted(0.8, 0i64..6), 0..25)
}

proptest! {
    #[test]
    fn left_join_groups_recover_left_rows(left_keys in keys(), right_keys in keys()) {
        let left = table(&left_keys, "left_row");
        let right = table(&right_keys, "right_row");
        let joined = join(&left, &right, &JoinKey::tic_id(), &JoinOptions::left()).unwrap();

        let groups = joined.left_groups();
        prop_assert_eq!(groups.len(), left.len());
        for (i, group) in groups.iter().enumerate() {
            prop_assert_eq!(group.left_row, i);
            prop_assert!(!group.rows.is_empty());
        }
        let first = joined.first_rows().unwrap();
        prop_assert_eq!(ints(&first, "left_row"), ints(&left, "left_row"));
        prop_assert_eq!(ints(&first, "tic_id"), ints(&left, "tic_id"));
    }

    #[test]
    fn first_wins_is_one_to_one(left_keys in keys(), right_keys in keys()) {
        let left = table(&left_keys, "left_row");
        let right = table(&right_keys, "right_row");
        let joined = join(&left, &right, &JoinKey::tic_id(), &JoinOptions::left().first_wins()).unwrap();
        prop_assert_eq!(joined.len(), left.len());
        for (row, right_row) in joined.right_rows.iter().enumerate() {
            let key = left_keys[row];
            match right_row {
                Some(r) => {
                    prop_assert_eq!(right_keys[*r], key);
                    prop_assert!(right_keys[..*r].iter().all(|k| *k != key));
                }
                None => prop_assert!(key.is_none() || !right_keys.contains(&key)),
            }
        }
    }

    #[test]
    fn inner_join_only_keeps_matches(left_keys in keys(), right_keys in keys()) {
        let left = table(&left_keys, "left_row");
        let right = table(&right_keys, "right_row");
        let joined = join(&left, &right, &JoinKey::tic_id(), &JoinOptions::inner()).unwrap();
        let expected: usize = left_keys
            .iter()
            .flatten()
            .map(|k| right_keys.iter().filter(|r| **r == Some(*k)).count())
            .sum();
        prop_assert_eq!(joined.len(), expected);
        prop_assert!(joined.right_rows.iter().all(Option::is_some));
    }
}
