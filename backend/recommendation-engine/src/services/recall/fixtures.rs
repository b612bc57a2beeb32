//! Shared catalog for strategy unit tests.

use crate::models::{ItemRecord, RatingRecord};
use crate::services::snapshot::Snapshot;

pub fn books() -> Vec<ItemRecord> {
    vec![
        ItemRecord::new(1, "Pride and Prejudice", "Romance", 4.2)
            .with_feature("genre", "romance")
            .with_feature("tags", vec!["classic", "love"]),
        ItemRecord::new(2, "To Kill a Mockingbird", "Classic", 4.5)
            .with_feature("genre", "drama")
            .with_feature("tags", vec!["classic"]),
        ItemRecord::new(3, "1984", "Dystopian", 4.3)
            .with_feature("genre", "dystopian")
            .with_feature("tags", vec!["classic", "politics"]),
        ItemRecord::new(4, "The Great Gatsby", "Classic", 4.0)
            .with_feature("genre", "drama")
            .with_feature("tags", vec!["classic", "love"]),
        ItemRecord::new(5, "The Hobbit", "Fantasy", 4.7)
            .with_feature("genre", "fantasy")
            .with_feature("tags", vec!["adventure"]),
        ItemRecord::new(6, "Dune", "SciFi", 4.4)
            .with_feature("genre", "scifi")
            .with_feature("tags", vec!["adventure", "politics"]),
    ]
}

/// User 2 agrees with user 1, user 3 disagrees, user 4 mostly agrees.
pub fn ratings() -> Vec<RatingRecord> {
    vec![
        RatingRecord::new(1, 1, 5),
        RatingRecord::new(1, 2, 4),
        RatingRecord::new(1, 3, 2),
        RatingRecord::new(2, 1, 5),
        RatingRecord::new(2, 2, 4),
        RatingRecord::new(2, 3, 2),
        RatingRecord::new(2, 4, 5),
        RatingRecord::new(2, 6, 1),
        RatingRecord::new(3, 1, 1),
        RatingRecord::new(3, 2, 2),
        RatingRecord::new(3, 3, 5),
        RatingRecord::new(3, 4, 1),
        RatingRecord::new(3, 5, 5),
        RatingRecord::new(4, 1, 4),
        RatingRecord::new(4, 2, 5),
        RatingRecord::new(4, 3, 1),
        RatingRecord::new(4, 5, 4),
    ]
}

pub fn snapshot() -> Snapshot {
    Snapshot::build(&ratings(), &books())
}
