//! Application layer containing the purchase lifecycle orchestration.
//!
//! This module defines the `PurchaseCoordinator`, the primary entry point for
//! purchases. A single listener task consumes backend transaction updates and
//! hands them to a lock-protected correlator, while every callback visible to
//! consumers is marshaled onto one `DeliveryContext` thread.

pub mod catalog;
pub mod coordinator;
pub mod correlation;
pub mod delivery;
pub mod eligibility;
pub mod listener;
