use crate::database::{CatalogDb, DbError, MembershipDb};
use crate::error::{Error, Result};
use crate::model::*;
use chrono::Utc;
use log::{debug, warn};

pub const PAGE_DEFAULT: u64 = 1;
pub const PAGE_SIZE_DEFAULT: u64 = 20;
pub const PAGE_SIZE_MAX: u64 = 100;

/// Adds content to the user's list. Adding something that is already there
/// returns the stored record as if it had just been created.
pub fn add_item<D>(
    db: &D,
    user_id: &str,
    content_id: &str,
    content_type: ContentType,
) -> Result<MembershipRecord>
where
    D: CatalogDb + MembershipDb,
{
    if content_id.is_empty() {
        return Err(Error::BadRequest("contentId must not be empty".to_owned()));
    }
    let item = db.get_catalog_item(content_id, content_type)?.ok_or_else(|| {
        Error::NotFound(match content_type {
            ContentType::Movie => "Movie not found".to_owned(),
            ContentType::Show => "Show not found".to_owned(),
        })
    })?;

    let record = MembershipRecord::snapshot(user_id, &item, Utc::now());
    match db.insert_membership_if_absent(&record) {
        Ok(upsert) => {
            if upsert.is_inserted() {
                debug!("Added {} {} to the list of {}", content_type, content_id, user_id);
            }
            Ok(upsert.into_inner())
        }
        Err(DbError::Duplicate { .. }) => {
            // Lost the race against a concurrent add; the winner's record is the answer.
            warn!("Concurrent add of {} for {}, re-fetching", content_id, user_id);
            db.get_membership(user_id, content_id)?.ok_or_else(|| {
                Error::Conflict(format!(
                    "{} could not be added to the list, try again",
                    content_id
                ))
            })
        }
        Err(err) => Err(err.into()),
    }
}

pub fn remove_item<D: MembershipDb>(db: &D, user_id: &str, content_id: &str) -> Result<()> {
    if db.remove_membership(user_id, content_id)? {
        debug!("Removed {} from the list of {}", content_id, user_id);
        Ok(())
    } else {
        Err(Error::NotFound("Item not found in list".to_owned()))
    }
}

/// Missing or zero paging inputs fall back to the defaults, anything else is
/// clamped into range.
pub fn list_items<D: MembershipDb>(
    db: &D,
    user_id: &str,
    page: Option<i64>,
    page_size: Option<i64>,
) -> Result<ListPage> {
    let page = clamp_page(page);
    let page_size = clamp_page_size(page_size);
    let offset = (page - 1).saturating_mul(page_size);
    let items = db.list_memberships(
        user_id,
        usize::try_from(offset).unwrap_or(usize::MAX),
        page_size as usize,
    )?;
    let total = db.count_memberships(user_id)?;
    Ok(ListPage {
        items,
        page,
        page_size,
        total,
    })
}

fn clamp_page(page: Option<i64>) -> u64 {
    match page {
        None | Some(0) => PAGE_DEFAULT,
        Some(page) => page.max(1) as u64,
    }
}

fn clamp_page_size(page_size: Option<i64>) -> u64 {
    match page_size {
        None | Some(0) => PAGE_SIZE_DEFAULT,
        Some(size) => (size.max(1) as u64).min(PAGE_SIZE_MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{self, DbResult};
    use std::collections::BTreeSet;

    fn seeded_db() -> sled::Db {
        let db = database::open(None).unwrap();
        db.put_catalog_item(&catalog_item("movie-1", ContentType::Movie, "Fast Action", "Action"))
            .unwrap();
        db.put_catalog_item(&catalog_item(
            "movie-2",
            ContentType::Movie,
            "Laugh Out Loud",
            "Comedy",
        ))
        .unwrap();
        db.put_catalog_item(&catalog_item("tv-1", ContentType::Show, "Space Journey", "SciFi"))
            .unwrap();
        db
    }

    fn catalog_item(id: &str, content_type: ContentType, title: &str, genre: &str) -> CatalogItem {
        CatalogItem {
            id: id.to_owned(),
            content_type,
            title: title.to_owned(),
            description: String::new(),
            genres: vec![genre.to_owned()].into_iter().collect(),
        }
    }

    #[test]
    fn add_is_idempotent() {
        let db = seeded_db();
        let first = add_item(&db, "u1", "movie-1", ContentType::Movie).unwrap();
        assert_eq!(first.content_id, "movie-1");
        let second = add_item(&db, "u1", "movie-1", ContentType::Movie).unwrap();
        assert_eq!(second, first);
        assert_eq!(db.count_memberships("u1").unwrap(), 1);
    }

    #[test]
    fn add_copies_a_snapshot_of_the_catalog() {
        let db = seeded_db();
        let record = add_item(&db, "u1", "tv-1", ContentType::Show).unwrap();
        assert_eq!(record.title_snapshot, "Space Journey");
        assert_eq!(record.content_type, ContentType::Show);
        assert_eq!(
            record.genres_snapshot,
            vec!["SciFi".to_owned()].into_iter().collect::<BTreeSet<_>>()
        );

        db.put_catalog_item(&catalog_item("tv-1", ContentType::Show, "Renamed", "Drama"))
            .unwrap();
        let again = add_item(&db, "u1", "tv-1", ContentType::Show).unwrap();
        assert_eq!(again.title_snapshot, "Space Journey");
        let stored = db.get_membership("u1", "tv-1").unwrap().unwrap();
        assert_eq!(stored, record);
    }

    #[test]
    fn add_rejects_unknown_and_empty_content() {
        let db = seeded_db();
        assert!(matches!(
            add_item(&db, "u1", "ghost", ContentType::Movie),
            Err(Error::NotFound(_))
        ));
        // The catalog lookup is per type.
        assert!(matches!(
            add_item(&db, "u1", "tv-1", ContentType::Movie),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            add_item(&db, "u1", "", ContentType::Movie),
            Err(Error::BadRequest(_))
        ));
        assert_eq!(db.count_memberships("u1").unwrap(), 0);
    }

    #[test]
    fn remove_succeeds_exactly_once() {
        let db = seeded_db();
        add_item(&db, "u1", "movie-1", ContentType::Movie).unwrap();
        remove_item(&db, "u1", "movie-1").unwrap();
        assert!(matches!(
            remove_item(&db, "u1", "movie-1"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn list_pages_newest_first() {
        let db = seeded_db();
        add_item(&db, "u1", "movie-1", ContentType::Movie).unwrap();
        add_item(&db, "u1", "movie-2", ContentType::Movie).unwrap();
        add_item(&db, "u1", "tv-1", ContentType::Show).unwrap();
        add_item(&db, "u2", "movie-1", ContentType::Movie).unwrap();

        let all = list_items(&db, "u1", None, None).unwrap();
        assert_eq!(all.total, 3);
        assert_eq!((all.page, all.page_size), (1, 20));
        let ids = all.items.iter().map(|r| r.content_id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, ["tv-1", "movie-2", "movie-1"]);
        assert!(all.items.windows(2).all(|w| w[0].added_at >= w[1].added_at));

        let first = list_items(&db, "u1", Some(1), Some(1)).unwrap();
        assert_eq!(first.items.len(), 1);
        assert_eq!(first.total, 3);
        let second = list_items(&db, "u1", Some(2), Some(2)).unwrap();
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0].content_id, "movie-1");

        let beyond = list_items(&db, "u1", Some(10), Some(20)).unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total, 3);
    }

    #[test]
    fn list_coerces_paging_inputs() {
        let db = seeded_db();
        let page = list_items(&db, "u1", Some(-3), Some(500)).unwrap();
        assert_eq!((page.page, page.page_size), (1, 100));
        let page = list_items(&db, "u1", Some(0), Some(0)).unwrap();
        assert_eq!((page.page, page.page_size), (1, 20));
        let page = list_items(&db, "u1", Some(4), Some(-1)).unwrap();
        assert_eq!((page.page, page.page_size), (4, 1));
        let page = list_items(&db, "u1", Some(i64::MAX), Some(100)).unwrap();
        assert!(page.items.is_empty());
    }

    /// Store whose insert always loses a race against `winner`.
    struct RacingDb {
        inner: sled::Db,
        winner: Option<MembershipRecord>,
    }

    impl CatalogDb for RacingDb {
        fn put_catalog_item(&self, item: &CatalogItem) -> DbResult<Option<CatalogItem>> {
            self.inner.put_catalog_item(item)
        }

        fn get_catalog_item(
            &self,
            id: &str,
            content_type: ContentType,
        ) -> DbResult<Option<CatalogItem>> {
            self.inner.get_catalog_item(id, content_type)
        }
    }

    impl MembershipDb for RacingDb {
        fn insert_membership_if_absent(
            &self,
            record: &MembershipRecord,
        ) -> DbResult<Upsert<MembershipRecord>> {
            if let Some(winner) = &self.winner {
                self.inner.insert_membership_if_absent(winner)?;
            }
            Err(DbError::Duplicate {
                user_id: record.user_id.clone(),
                content_id: record.content_id.clone(),
            })
        }

        fn get_membership(
            &self,
            user_id: &str,
            content_id: &str,
        ) -> DbResult<Option<MembershipRecord>> {
            self.inner.get_membership(user_id, content_id)
        }

        fn remove_membership(&self, user_id: &str, content_id: &str) -> DbResult<bool> {
            self.inner.remove_membership(user_id, content_id)
        }

        fn list_memberships(
            &self,
            user_id: &str,
            offset: usize,
            limit: usize,
        ) -> DbResult<Vec<MembershipRecord>> {
            self.inner.list_memberships(user_id, offset, limit)
        }

        fn count_memberships(&self, user_id: &str) -> DbResult<u64> {
            self.inner.count_memberships(user_id)
        }
    }

    #[test]
    fn lost_race_returns_the_winning_record() {
        let inner = seeded_db();
        let item = inner
            .get_catalog_item("movie-1", ContentType::Movie)
            .unwrap()
            .unwrap();
        let winner = MembershipRecord::snapshot("u1", &item, Utc::now());
        let db = RacingDb {
            inner,
            winner: Some(winner.clone()),
        };
        let record = add_item(&db, "u1", "movie-1", ContentType::Movie).unwrap();
        assert_eq!(record, winner);
        assert_eq!(db.count_memberships("u1").unwrap(), 1);
    }

    #[test]
    fn unreconcilable_race_is_a_conflict() {
        let db = RacingDb {
            inner: seeded_db(),
            winner: None,
        };
        assert!(matches!(
            add_item(&db, "u1", "movie-1", ContentType::Movie),
            Err(Error::Conflict(_))
        ));
    }
}
