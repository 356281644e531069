//! Persistent pools of unconsumed words, one or more per (category, language).
//!
//! Entries are consumed without replacement: every read removes the returned
//! entry, and a pool that runs dry is deleted instead of being stored empty.
//! Pools for the same key created by racing generations are not merged.

use r2d2_sqlite::rusqlite::{params, Connection, OptionalExtension};
use rand::Rng;
use serde::Serialize;
use time::OffsetDateTime;

use crate::db::DbPool;
use crate::errors::GameError;
use crate::model::{Language, WordWithHints};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WordPool {
    pub id: i64,
    pub key: String,
    pub category: String,
    pub language: Language,
    pub entries: Vec<WordWithHints>,
    pub usage_count: i64,
    pub created_at: i64,
}

#[derive(Clone)]
pub struct WordPoolCache {
    pool: DbPool,
}

impl WordPoolCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Oldest pool stored for the key, if any.
    pub fn lookup(&self, category: &str, language: Language) -> Result<Option<WordPool>, GameError> {
        let conn = self.pool.get()?;
        lookup(&conn, &category.to_lowercase(), language)
    }

    /// Remove and return a uniformly chosen entry. The second element is the
    /// pool as persisted afterwards, or `None` once it has been deleted.
    pub fn consume_random<R: Rng + ?Sized>(
        &self,
        mut pool: WordPool,
        rng: &mut R,
    ) -> Result<(WordWithHints, Option<WordPool>), GameError> {
        if pool.entries.is_empty() {
            return Err(GameError::Storage(format!("word pool {} has no entries left", pool.key)));
        }
        let index = rng.gen_range(0..pool.entries.len());
        let entry = pool.entries.remove(index);

        let conn = self.pool.get()?;
        if pool.entries.is_empty() {
            conn.execute("DELETE FROM word_pools WHERE id = ?1", params![pool.id])?;
            return Ok((entry, None));
        }

        pool.usage_count += 1;
        let entries_json = serde_json::to_string(&pool.entries)?;
        conn.execute(
            "UPDATE word_pools SET entries_json = ?1, usage_count = ?2 WHERE id = ?3",
            params![entries_json, pool.usage_count, pool.id],
        )?;
        Ok((entry, Some(pool)))
    }

    pub fn store(
        &self,
        category: &str,
        language: Language,
        entries: Vec<WordWithHints>,
        initial_usage_count: i64,
    ) -> Result<WordPool, GameError> {
        if entries.is_empty() {
            return Err(GameError::Validation("refusing to store an empty word pool".into()));
        }
        let category = category.to_lowercase();
        let created_at = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let key = format!("{category}-{}-{created_at}", language.code());
        let entries_json = serde_json::to_string(&entries)?;

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO word_pools (pool_key, category, language, entries_json, usage_count, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![key, category, language.code(), entries_json, initial_usage_count, created_at],
        )?;
        Ok(WordPool {
            id: conn.last_insert_rowid(),
            key,
            category,
            language,
            entries,
            usage_count: initial_usage_count,
            created_at,
        })
    }

    /// Total unconsumed entries across every pool for the key.
    pub fn count_for(&self, category: &str, language: Language) -> Result<usize, GameError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT entries_json FROM word_pools WHERE category = ?1 AND language = ?2",
        )?;
        let rows = stmt.query_map(params![category.to_lowercase(), language.code()], |row| {
            row.get::<_, String>(0)
        })?;
        let mut total = 0;
        for raw in rows {
            let entries: Vec<WordWithHints> = serde_json::from_str(&raw?)?;
            total += entries.len();
        }
        Ok(total)
    }
}

fn lookup(conn: &Connection, category: &str, language: Language) -> Result<Option<WordPool>, GameError> {
    let row = conn
        .query_row(
            "SELECT id, pool_key, entries_json, usage_count, created_at FROM word_pools
             WHERE category = ?1 AND language = ?2
             ORDER BY created_at ASC, id ASC LIMIT 1",
            params![category, language.code()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, key, entries_json, usage_count, created_at)) = row else {
        return Ok(None);
    };
    Ok(Some(WordPool {
        id,
        key,
        category: category.to_string(),
        language,
        entries: serde_json::from_str(&entries_json)?,
        usage_count,
        created_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_db;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn entries(n: usize) -> Vec<WordWithHints> {
        (0..n)
            .map(|i| WordWithHints {
                word: format!("word{i}"),
                hints: [format!("a{i}"), format!("b{i}"), format!("c{i}")],
            })
            .collect()
    }

    fn cache() -> WordPoolCache {
        WordPoolCache::new(init_memory_db().unwrap())
    }

    #[test]
    fn store_then_lookup_is_case_insensitive_on_category() {
        let cache = cache();
        let stored = cache.store("Animals", Language::En, entries(3), 1).unwrap();
        assert!(stored.key.starts_with("animals-en-"));
        let found = cache.lookup("ANIMALS", Language::En).unwrap().unwrap();
        assert_eq!(found, stored);
        assert!(cache.lookup("animals", Language::De).unwrap().is_none());
    }

    #[test]
    fn consume_removes_exactly_the_returned_entry() {
        let cache = cache();
        let mut rng = StdRng::seed_from_u64(7);
        let pool = cache.store("food", Language::Sv, entries(5), 1).unwrap();
        let (entry, updated) = cache.consume_random(pool, &mut rng).unwrap();
        let updated = updated.unwrap();
        assert_eq!(updated.entries.len(), 4);
        assert!(!updated.entries.contains(&entry));
        assert_eq!(updated.usage_count, 2);

        let reloaded = cache.lookup("food", Language::Sv).unwrap().unwrap();
        assert_eq!(reloaded.entries, updated.entries);
        assert_eq!(reloaded.usage_count, 2);
    }

    #[test]
    fn draining_a_pool_deletes_it_and_never_repeats() {
        let cache = cache();
        let mut rng = StdRng::seed_from_u64(42);
        cache.store("places", Language::En, entries(4), 1).unwrap();
        let mut seen = Vec::new();
        while let Some(pool) = cache.lookup("places", Language::En).unwrap() {
            let (entry, _) = cache.consume_random(pool, &mut rng).unwrap();
            assert!(!seen.contains(&entry));
            seen.push(entry);
        }
        assert_eq!(seen.len(), 4);
        assert_eq!(cache.count_for("places", Language::En).unwrap(), 0);
    }

    #[test]
    fn single_entry_pool_ceases_to_exist() {
        let cache = cache();
        let pool = cache.store("music", Language::De, entries(1), 1).unwrap();
        let (_, updated) = cache.consume_random(pool, &mut rand::thread_rng()).unwrap();
        assert!(updated.is_none());
        assert!(cache.lookup("music", Language::De).unwrap().is_none());
    }

    #[test]
    fn consuming_a_drained_pool_is_a_storage_error() {
        let cache = cache();
        let mut pool = cache.store("tools", Language::En, entries(1), 1).unwrap();
        pool.entries.clear();
        assert!(matches!(
            cache.consume_random(pool, &mut rand::thread_rng()),
            Err(GameError::Storage(_))
        ));
    }

    #[test]
    fn duplicate_pools_for_a_key_coexist() {
        let cache = cache();
        cache.store("sports", Language::En, entries(2), 1).unwrap();
        cache.store("sports", Language::En, entries(3), 1).unwrap();
        assert_eq!(cache.count_for("sports", Language::En).unwrap(), 5);
    }

    #[test]
    fn empty_pools_are_never_stored() {
        let cache = cache();
        assert!(matches!(
            cache.store("nature", Language::En, Vec::new(), 1),
            Err(GameError::Validation(_))
        ));
    }
}
