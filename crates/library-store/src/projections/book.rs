//! Book projection repository (spec §4.3), backed by `book_projections`.

use crate::projections::diesel_projection_repository;

diesel_projection_repository!(BookProjectionRepository, book_projections, "Book");
