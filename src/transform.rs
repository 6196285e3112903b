//! RAWG record -> GameDto mapping
//!
//! Pure and total: every lookup falls back to null or an empty list, so a
//! record can be transformed again on resume with the same result.

use serde_json::Value;

use crate::models::GameDto;

pub const SOURCE_TAG: &str = "rawg";

pub fn to_dto(game: &Value) -> GameDto {
    let id = game.get("id").and_then(Value::as_i64);

    GameDto {
        id,
        external_api_id: external_api_id(game.get("id")),
        title: str_field(game, "name"),
        description: str_field(game, "description_raw")
            .filter(|d| !d.is_empty())
            .or_else(|| str_field(game, "slug")),
        cover_image_url: str_field(game, "background_image"),
        release_date: str_field(game, "released"),
        platforms: names(game.get("platforms"), |p| {
            p.get("platform").and_then(|inner| inner.get("name"))
        }),
        genres: names(game.get("genres"), |g| g.get("name")),
    }
}

fn external_api_id(id: Option<&Value>) -> String {
    match id {
        Some(Value::String(s)) => format!("{}-{}", SOURCE_TAG, s),
        Some(v) => format!("{}-{}", SOURCE_TAG, v),
        None => format!("{}-null", SOURCE_TAG),
    }
}

fn str_field(game: &Value, key: &str) -> Option<String> {
    game.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Flatten an array of nested objects into their display names, keeping order.
/// Entries without a string name are skipped.
fn names<'a, F>(list: Option<&'a Value>, pick: F) -> Vec<String>
where
    F: Fn(&'a Value) -> Option<&'a Value>,
{
    list.and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| pick(item).and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
