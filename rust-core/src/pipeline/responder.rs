use serde::{Deserialize, Serialize};

/// Which scripted answer the generate stage returns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    BeachLocation,
    Parking,
    General,
}

pub fn classify_query(message: &str) -> ResponseKind {
    let lower = message.to_lowercase();

    // Simple keyword-based selection, first match wins
    if contains_beach_keywords(&lower) && contains_location_keywords(&lower) {
        ResponseKind::BeachLocation
    } else if contains_parking_keywords(&lower) {
        ResponseKind::Parking
    } else {
        ResponseKind::General
    }
}

pub fn scripted_response(kind: ResponseKind) -> &'static str {
    match kind {
        ResponseKind::BeachLocation => BEACH_LOCATION_RESPONSE,
        ResponseKind::Parking => PARKING_RESPONSE,
        ResponseKind::General => GENERAL_RESPONSE,
    }
}

/// Classify the query and return the matching canned answer.
pub fn respond(message: &str) -> (ResponseKind, &'static str) {
    let kind = classify_query(message);
    (kind, scripted_response(kind))
}

fn contains_beach_keywords(text: &str) -> bool {
    let keywords = ["beach", "seaside", "ocean", "waterfront"];
    keywords.iter().any(|kw| text.contains(kw))
}

fn contains_location_keywords(text: &str) -> bool {
    let keywords = ["st kilda", "st. kilda", "saint kilda"];
    keywords.iter().any(|kw| text.contains(kw))
}

fn contains_parking_keywords(text: &str) -> bool {
    let keywords = ["parking", "garage", "car space", "carport"];
    keywords.iter().any(|kw| text.contains(kw))
}

const BEACH_LOCATION_RESPONSE: &str = "I found 2 listings in St Kilda close to the beach:

1. 42 Beach Rd: a 2-bedroom apartment at $450/week with a pool and secure parking, a short walk from the sand.

2. 15 Acland St: a renovated 2-bedroom apartment at $520/week with a large balcony and partial bay views.

Both are within walking distance of the beach. Want more detail on either one?";

const PARKING_RESPONSE: &str = "These 2 listings include parking:

1. 42 Beach Rd, St Kilda: a 2-bedroom apartment at $450/week with secure parking, a pool and beach access.

2. 78 Carlisle St, St Kilda: a 1-bedroom apartment at $380/week with parking and a building gym.

Beach Rd costs more but adds the pool and the beach location.";

const GENERAL_RESPONSE: &str = "Here are the listings that best match your search:

1. 42 Beach Rd, St Kilda: 2-bedroom apartment, $450/week, near the beach with pool and parking.

2. 15 Acland St, St Kilda: 2-bedroom apartment, $520/week, balcony with bay views.

3. 78 Carlisle St, St Kilda: 1-bedroom apartment, $380/week, gym access, cheapest option.

4. 22 Tennyson St, Elwood: 3-bedroom house, $750/week, backyard, for more space.

Would you like more information about any of these?";
