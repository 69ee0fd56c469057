//! Property tests: bundle reference counts always equal the number of live
//! lambdas referencing the bundle, across random create/delete sequences.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{collections::HashMap, sync::Arc};

use proptest::prelude::*;
use stratus_lambda::{LambdaManager, StaticNamespaces};
use stratus_store::Database;
use stratus_types::{BundleHash, ErrorCode, Lambda, LambdaUuid, Namespace, Runtime};

#[derive(Debug, Clone)]
enum Op {
    Create { namespace: usize, uuid: usize, hash: usize },
    Delete { namespace: usize, uuid: usize },
}

const NAMESPACES: [&str; 2] = ["", "acme"];
const HASHES: [&str; 3] = ["h0", "h1", "h2"];

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..NAMESPACES.len(), 0..4usize, 0..HASHES.len())
            .prop_map(|(namespace, uuid, hash)| Op::Create { namespace, uuid, hash }),
        (0..NAMESPACES.len(), 0..4usize)
            .prop_map(|(namespace, uuid)| Op::Delete { namespace, uuid }),
    ]
}

fn lambda(namespace: usize, uuid: usize, hash: usize) -> Lambda {
    Lambda {
        namespace: Namespace::new(NAMESPACES[namespace]),
        uuid: LambdaUuid::new(format!("fn-{uuid}")),
        runtime: Runtime::new("node"),
        bundle_hash: BundleHash::new(HASHES[hash]),
        ensure_exactly_one_delivery: false,
    }
}

proptest! {
    #[test]
    fn bundle_refcounts_match_live_lambdas(ops in proptest::collection::vec(arb_op(), 1..40)) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let manager = LambdaManager::builder()
            .db(Arc::new(Database::open_in_memory()))
            .namespaces(Arc::new(StaticNamespaces::new(["acme"])))
            .build();
        let mut live: HashMap<(usize, usize), usize> = HashMap::new();

        for op in &ops {
            match *op {
                Op::Create { namespace, uuid, hash } => {
                    let result =
                        runtime.block_on(manager.create(lambda(namespace, uuid, hash), b"code"));
                    if live.contains_key(&(namespace, uuid)) {
                        prop_assert_eq!(result.unwrap_err().code(), ErrorCode::AlreadyExists);
                    } else {
                        result.unwrap();
                        live.insert((namespace, uuid), hash);
                    }
                },
                Op::Delete { namespace, uuid } => {
                    let record = lambda(namespace, uuid, 0);
                    runtime.block_on(manager.delete(&record.namespace, &record.uuid)).unwrap();
                    live.remove(&(namespace, uuid));
                },
            }
        }

        for (index, hash) in HASHES.iter().enumerate() {
            let expected = live.values().filter(|h| **h == index).count() as u64;
            let actual = manager.bundle_reference_count(&BundleHash::new(*hash)).unwrap();
            if expected == 0 {
                prop_assert_eq!(actual, None, "bundle {} should be deleted", hash);
            } else {
                prop_assert_eq!(actual, Some(expected), "bundle {} refcount", hash);
            }
        }
        for ((namespace, uuid), hash) in &live {
            let record = lambda(*namespace, *uuid, *hash);
            let stored = manager.get(&record.namespace, &record.uuid).unwrap();
            prop_assert_eq!(stored.bundle_hash, record.bundle_hash);
        }
    }
}
