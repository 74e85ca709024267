//! EcoLearn - Climate education platform backend
//!
//! Lessons and quizzes, coding challenges with a carbon calculator, and a
//! gamification layer of points, badges, achievements and leaderboards.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
