//! Reservation projection repository (spec §4.3), backed by `reservation_projections`.

use crate::projections::diesel_projection_repository;

diesel_projection_repository!(ReservationProjectionRepository, reservation_projections, "Reservation");
