//! Wallet projection repository (spec §4.3), backed by `wallet_projections`.

use crate::projections::diesel_projection_repository;

diesel_projection_repository!(WalletProjectionRepository, wallet_projections, "Wallet");
