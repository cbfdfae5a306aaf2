//! The swap engine: anonymized many-to-many redistribution of thoughts.
//!
//! Pure functions over value types; the Room writes results into its
//! distribution and performs fan-out.

use std::collections::{HashMap, HashSet};

use rand::seq::SliceRandom;
use rand::Rng;
use uuid::Uuid;

/// Shuffle retries before falling back to pairwise repair
const MAX_RESHUFFLES: usize = 5;

#[derive(Debug, Clone)]
pub struct ThoughtCard {
    pub content: String,
    pub author_user_id: Uuid,
    pub author_name: String,
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub connection_id: Uuid,
    pub user_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct Assignment {
    pub content: String,
    pub author_user_id: Uuid,
    pub author_name: String,
}

/// Assign exactly one thought to every recipient.
///
/// Oversubscription: when there are fewer thoughts than recipients the pool
/// cycles through the thought list until it covers everyone; when there are
/// more, the surplus goes undelivered this round. After a uniform shuffle the
/// no-own-thought constraint is enforced best-effort: bounded reshuffles,
/// then pairwise repair. With a single distinct author the constraint is
/// unsatisfiable and the pool is delivered as is.
pub fn assign(
    thoughts: &[ThoughtCard],
    recipients: &[Recipient],
    rng: &mut impl Rng,
) -> HashMap<Uuid, Assignment> {
    if thoughts.is_empty() || recipients.is_empty() {
        return HashMap::new();
    }

    let mut pool: Vec<ThoughtCard> = thoughts
        .iter()
        .cycle()
        .take(recipients.len())
        .cloned()
        .collect();

    pool.shuffle(rng);
    for _ in 0..MAX_RESHUFFLES {
        if conflict_positions(&pool, recipients).is_empty() {
            break;
        }
        pool.shuffle(rng);
    }

    let distinct_authors: HashSet<Uuid> = pool.iter().map(|t| t.author_user_id).collect();
    if distinct_authors.len() >= 2 {
        repair_conflicts(&mut pool, recipients);
    }

    recipients
        .iter()
        .zip(pool)
        .map(|(recipient, card)| {
            (
                recipient.connection_id,
                Assignment {
                    content: card.content,
                    author_user_id: card.author_user_id,
                    author_name: card.author_name,
                },
            )
        })
        .collect()
}

/// Pick a uniformly random element; used by re-swap and reassignment.
pub fn pick_random<'a, T>(pool: &'a [T], rng: &mut impl Rng) -> Option<&'a T> {
    if pool.is_empty() {
        return None;
    }
    Some(&pool[rng.gen_range(0..pool.len())])
}

fn conflict_positions(pool: &[ThoughtCard], recipients: &[Recipient]) -> Vec<usize> {
    pool.iter()
        .zip(recipients)
        .enumerate()
        .filter(|(_, (card, recipient))| card.author_user_id == recipient.user_id)
        .map(|(i, _)| i)
        .collect()
}

fn repair_conflicts(pool: &mut [ThoughtCard], recipients: &[Recipient]) {
    for i in conflict_positions(pool, recipients) {
        // A previous swap may already have resolved this position
        if pool[i].author_user_id != recipients[i].user_id {
            continue;
        }
        let partner = (0..pool.len()).find(|&j| {
            j != i
                && pool[j].author_user_id != recipients[i].user_id
                && pool[i].author_user_id != recipients[j].user_id
        });
        if let Some(j) = partner {
            pool.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn card(content: &str, author: Uuid) -> ThoughtCard {
        ThoughtCard {
            content: content.to_string(),
            author_user_id: author,
            author_name: format!("author-{}", content),
        }
    }

    fn recipient(user: Uuid) -> Recipient {
        Recipient {
            connection_id: Uuid::new_v4(),
            user_id: user,
            name: "student".to_string(),
        }
    }

    #[test]
    fn test_two_students_always_exchange() {
        let (s1, s2) = (Uuid::new_v4(), Uuid::new_v4());
        let thoughts = vec![card("A", s1), card("B", s2)];
        let recipients = vec![recipient(s1), recipient(s2)];

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let assigned = assign(&thoughts, &recipients, &mut rng);
            assert_eq!(assigned[&recipients[0].connection_id].content, "B");
            assert_eq!(assigned[&recipients[1].connection_id].content, "A");
        }
    }

    #[test]
    fn test_single_author_is_delivered_as_is() {
        let s1 = Uuid::new_v4();
        let s2 = Uuid::new_v4();
        let thoughts = vec![card("A", s1)];
        let recipients = vec![recipient(s1), recipient(s2)];

        let mut rng = StdRng::seed_from_u64(7);
        let assigned = assign(&thoughts, &recipients, &mut rng);
        assert_eq!(assigned.len(), 2);
        // Everyone gets the sole thought, including its author
        for recipient in &recipients {
            assert_eq!(assigned[&recipient.connection_id].content, "A");
        }
    }

    #[test]
    fn test_no_own_thought_with_many_authors() {
        let users: Vec<Uuid> = (0..6).map(|_| Uuid::new_v4()).collect();
        let thoughts: Vec<ThoughtCard> = users
            .iter()
            .enumerate()
            .map(|(i, &u)| card(&format!("t{}", i), u))
            .collect();
        let recipients: Vec<Recipient> = users.iter().map(|&u| recipient(u)).collect();

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let assigned = assign(&thoughts, &recipients, &mut rng);
            for recipient in &recipients {
                assert_ne!(
                    assigned[&recipient.connection_id].author_user_id, recipient.user_id,
                    "seed {} assigned a student their own thought",
                    seed
                );
            }
        }
    }

    #[test]
    fn test_oversubscription_cycles_the_pool() {
        let (a1, a2) = (Uuid::new_v4(), Uuid::new_v4());
        let thoughts = vec![card("A", a1), card("B", a2)];
        let recipients: Vec<Recipient> = (0..5).map(|_| recipient(Uuid::new_v4())).collect();

        let mut rng = StdRng::seed_from_u64(3);
        let assigned = assign(&thoughts, &recipients, &mut rng);
        assert_eq!(assigned.len(), 5);

        let delivered_a = assigned.values().filter(|a| a.content == "A").count();
        let delivered_b = assigned.values().filter(|a| a.content == "B").count();
        assert!(delivered_a >= 1 && delivered_b >= 1);
        assert_eq!(delivered_a + delivered_b, 5);
    }

    #[test]
    fn test_surplus_thoughts_are_truncated() {
        let thoughts: Vec<ThoughtCard> = (0..5)
            .map(|i| card(&format!("t{}", i), Uuid::new_v4()))
            .collect();
        let recipients: Vec<Recipient> = (0..2).map(|_| recipient(Uuid::new_v4())).collect();

        let mut rng = StdRng::seed_from_u64(11);
        let assigned = assign(&thoughts, &recipients, &mut rng);
        assert_eq!(assigned.len(), 2);
    }

    #[test]
    fn test_no_recipients_yields_empty_distribution() {
        let thoughts = vec![card("A", Uuid::new_v4())];
        let mut rng = StdRng::seed_from_u64(0);
        assert!(assign(&thoughts, &[], &mut rng).is_empty());
        assert!(assign(&[], &[recipient(Uuid::new_v4())], &mut rng).is_empty());
    }

    #[test]
    fn test_pick_random_stays_in_bounds() {
        let pool = vec![1, 2, 3];
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..20 {
            assert!(pool.contains(pick_random(&pool, &mut rng).unwrap()));
        }
        let empty: Vec<i32> = vec![];
        assert!(pick_random(&empty, &mut rng).is_none());
    }
}
