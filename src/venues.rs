use crate::data::{Allocation, Venue};

/// Venues of an accepted type whose tolerated capacity fits the whole group.
/// Keeps input order.
pub fn eligible<'a>(allocation: &Allocation, venues: &'a [Venue]) -> Vec<&'a Venue> {
    venues
        .iter()
        .filter(|venue| is_eligible(allocation, venue))
        .collect()
}

fn is_eligible(allocation: &Allocation, venue: &Venue) -> bool {
    // any type is acceptable when none is required
    let type_ok = allocation.required_venue_type_ids.is_empty()
        || allocation.required_venue_type_ids.contains(&venue.type_id);

    type_ok && allocation.number_of_students <= venue.capacity_limit()
}
