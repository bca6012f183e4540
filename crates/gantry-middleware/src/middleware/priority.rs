//! Priority ranking
//!
//! A named descriptor ranks by its position in the *reversed* priority list:
//! the last configured entry has rank 0 and the first has the highest rank.
//! Inline stages and names missing from the list rank -1. Higher ranks run
//! first.

use super::descriptor::Descriptor;
use std::cmp::Reverse;

/// Rank of a descriptor against the priority list
pub fn rank(descriptor: &Descriptor, priority: &[String]) -> isize {
    descriptor
        .reference()
        .and_then(|name| priority.iter().rev().position(|entry| entry == name))
        .map_or(-1, |index| index as isize)
}

/// Sort descending by rank. The sort is stable: equal ranks keep queue order.
pub fn sort_by_priority(descriptors: &mut [Descriptor], priority: &[String]) {
    if priority.is_empty() {
        return;
    }
    descriptors.sort_by_key(|descriptor| Reverse(rank(descriptor, priority)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{Next, Params};
    use crate::request::Request;
    use std::sync::Arc;

    fn named(name: &str) -> Descriptor {
        Descriptor::Named {
            name: name.to_string(),
            params: Params::empty(),
        }
    }

    fn priority(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn order(descriptors: &[Descriptor]) -> Vec<&str> {
        descriptors.iter().map(Descriptor::name).collect()
    }

    #[test]
    fn test_rank_uses_reversed_index() {
        let table = priority(&["a", "b", "c"]);

        assert_eq!(rank(&named("a"), &table), 2);
        assert_eq!(rank(&named("b"), &table), 1);
        assert_eq!(rank(&named("c"), &table), 0);
        assert_eq!(rank(&named("d"), &table), -1);
    }

    #[test]
    fn test_inline_stages_rank_lowest() {
        let stage = crate::middleware::FnStage::new(
            "a",
            |request: Request, next: Next, _params: Params| async move { next.run(request).await },
        );
        let inline = Descriptor::Inline {
            stage: Arc::new(stage),
            params: Params::empty(),
        };

        // an inline stage named like a priority entry still ranks -1
        assert_eq!(rank(&inline, &priority(&["a"])), -1);
    }

    #[test]
    fn test_sort_follows_priority_table() {
        let mut queue = vec![named("c"), named("a"), named("b")];
        sort_by_priority(&mut queue, &priority(&["a", "b", "c"]));

        assert_eq!(order(&queue), ["a", "b", "c"]);
    }

    #[test]
    fn test_unranked_entries_keep_order_after_ranked() {
        let mut queue = vec![named("x"), named("b"), named("y"), named("a"), named("z")];
        sort_by_priority(&mut queue, &priority(&["a", "b"]));

        assert_eq!(order(&queue), ["a", "b", "x", "y", "z"]);
    }

    #[test]
    fn test_empty_priority_leaves_queue_untouched() {
        let mut queue = vec![named("b"), named("a")];
        sort_by_priority(&mut queue, &[]);

        assert_eq!(order(&queue), ["b", "a"]);
    }
}
