use crate::database::{CatalogDb, DbResult};
use crate::model::{CatalogItem, ContentType};

fn item(
    id: &str,
    content_type: ContentType,
    title: &str,
    description: &str,
    genres: &[&str],
) -> CatalogItem {
    CatalogItem {
        id: id.to_owned(),
        content_type,
        title: title.to_owned(),
        description: description.to_owned(),
        genres: genres.iter().map(|g| (*g).to_owned()).collect(),
    }
}

pub fn demo_catalog() -> Vec<CatalogItem> {
    vec![
        item("movie-1", ContentType::Movie, "Fast Action", "High stakes adventure.", &["Action"]),
        item("movie-2", ContentType::Movie, "Laugh Out Loud", "A comedy to remember.", &["Comedy"]),
        item("tv-1", ContentType::Show, "Space Journey", "SciFi exploration.", &["SciFi"]),
        item(
            "tv-2",
            ContentType::Show,
            "Haunted Hallways",
            "Things that go bump.",
            &["Horror", "Drama"],
        ),
    ]
}

/// Writes the demo catalog, replacing entries with the same ids.
pub fn seed_demo_catalog<D: CatalogDb>(db: &D) -> DbResult<usize> {
    let catalog = demo_catalog();
    for item in &catalog {
        db.put_catalog_item(item)?;
    }
    Ok(catalog.len())
}
