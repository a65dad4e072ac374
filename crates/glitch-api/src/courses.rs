use axum::{Json, extract::State, response::IntoResponse};
use tracing::warn;

use glitch_types::api::Course;

use crate::state::{AppState, with_db};

/// `GET /api/courses`. Falls back to the built-in catalogue when the table
/// is empty or unreadable.
pub async fn list(State(state): State<AppState>) -> impl IntoResponse {
    match with_db(&state, |db| db.list_courses()).await {
        Ok(rows) if !rows.is_empty() => Json(
            rows.into_iter()
                .map(|row| Course {
                    id: row.id,
                    title: row.title,
                    description: row.description,
                    level: row.level,
                    duration: row.duration,
                    price: row.price,
                    image_url: row.image_url,
                })
                .collect::<Vec<_>>(),
        ),
        Ok(_) => Json(default_courses()),
        Err(e) => {
            warn!("Serving default courses: {}", e);
            Json(default_courses())
        }
    }
}

pub fn default_courses() -> Vec<Course> {
    let course = |id, title: &str, description: &str, level: &str, duration, price, image: &str| Course {
        id,
        title: title.to_string(),
        description: description.to_string(),
        level: level.to_string(),
        duration,
        price,
        image_url: format!("https://images.unsplash.com/{image}"),
    };

    vec![
        course(1, "E-Commerce", "Master Amazon FBA, Shopify, and dropshipping to build multiple income streams", "All Levels", 6, 99.99, "photo-1556742049-0cfed4f6a45d"),
        course(2, "Health & Fitness", "Build profitable fitness brands, coaching businesses, and supplement companies", "All Levels", 5, 79.99, "photo-1571019613454-1cb2f99b2d8b"),
        course(3, "Trading", "Master forex, stocks, and crypto trading strategies", "Intermediate", 8, 149.99, "photo-1611974789855-9c2a0a7236a3"),
        course(4, "Real Estate", "Master strategic property investment, REIT analysis, and PropTech opportunities", "Intermediate", 7, 119.99, "photo-1560518883-ce09059eeffa"),
        course(5, "Social Media", "Build massive personal brands and monetize digital influence", "All Levels", 4, 59.99, "photo-1611224923853-80b023f02d71"),
    ]
}
