//! HTTP Handlers
//! /api 以下のエンドポイント

pub mod admin;
pub mod auth;
pub mod cart;
pub mod health;
pub mod orders;
pub mod products;
pub mod users;
