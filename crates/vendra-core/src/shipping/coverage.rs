//! Coverage area resolution
//!
//! Picks the single best-matching area for a destination. Candidates
//! share the destination's province; specificity decides the winner and a
//! set-but-unmatched field disqualifies. The ordering is total, so the
//! same query always resolves to the same area.

use sqlx::PgPool;
use tracing::debug;

use crate::cache::{self, Cache};
use crate::models::{CoverageArea, CoverageQuery, CreateCoverageAreaRequest};
use crate::{Error, Result};

/// Specificity points per matched field
const POSTAL_POINTS: i32 = 8;
const SUBDISTRICT_POINTS: i32 = 4;
const DISTRICT_POINTS: i32 = 2;
const PROVINCE_POINTS: i32 = 1;

/// Score a candidate against a query. `None` disqualifies: either the
/// province differs, the area is inactive, or the area pins a field the
/// query does not match.
pub fn score(area: &CoverageArea, query: &CoverageQuery) -> Option<i32> {
    if !area.is_active {
        return None;
    }
    if !area.province.eq_ignore_ascii_case(&query.province) {
        return None;
    }

    let mut total = PROVINCE_POINTS;

    match field_score(&area.postal_code, &query.postal_code, POSTAL_POINTS) {
        Some(points) => total += points,
        None => return None,
    }
    match field_score(&area.subdistrict, &query.subdistrict, SUBDISTRICT_POINTS) {
        Some(points) => total += points,
        None => return None,
    }
    match field_score(&area.district, &query.district, DISTRICT_POINTS) {
        Some(points) => total += points,
        None => return None,
    }

    Some(total)
}

/// Points for one optional field: area wildcard scores zero, an exact
/// match scores `points`, anything else disqualifies.
fn field_score(area_field: &Option<String>, query_field: &Option<String>, points: i32) -> Option<i32> {
    match (area_field, query_field) {
        (None, _) => Some(0),
        (Some(a), Some(q)) if a.eq_ignore_ascii_case(q) => Some(points),
        (Some(_), _) => None,
    }
}

/// Pick the best-matching area out of a candidate list. Tie-breakers, in
/// order: higher score, lower priority_order, self-delivery preferred,
/// oldest created_at.
pub fn best_match<'a>(
    candidates: &'a [CoverageArea],
    query: &CoverageQuery,
) -> Option<&'a CoverageArea> {
    candidates
        .iter()
        .filter_map(|area| score(area, query).map(|s| (area, s)))
        .min_by(|(a, score_a), (b, score_b)| {
            score_b
                .cmp(score_a)
                .then(a.priority_order.cmp(&b.priority_order))
                .then(b.is_self_delivery_area.cmp(&a.is_self_delivery_area))
                .then(a.created_at.cmp(&b.created_at))
        })
        .map(|(area, _)| area)
}

pub struct CoverageResolver {
    pool: PgPool,
    cache: Cache,
}

impl CoverageResolver {
    pub fn new(pool: PgPool, cache: Cache) -> Self {
        Self { pool, cache }
    }

    /// Resolve the destination to its covering area
    pub async fn resolve(&self, query: &CoverageQuery) -> Result<CoverageArea> {
        if query.province.trim().is_empty() {
            return Err(Error::validation("province is required"));
        }

        let candidates = self.candidates(&query.province).await?;
        debug!(
            province = %query.province,
            candidates = candidates.len(),
            "resolving coverage"
        );

        best_match(&candidates, query)
            .cloned()
            .ok_or_else(|| Error::LocationNotCovered(query.province.clone()))
    }

    /// Active areas for a province, read through the cache
    async fn candidates(&self, province: &str) -> Result<Vec<CoverageArea>> {
        let key = cache::coverage_key(province);
        if let Some(areas) = self.cache.get::<Vec<CoverageArea>>(&key).await {
            return Ok(areas);
        }

        let areas = sqlx::query_as::<_, CoverageArea>(
            r#"
            SELECT * FROM coverage_areas
            WHERE is_active AND LOWER(province) = LOWER($1)
            ORDER BY priority_order ASC, created_at ASC
            "#,
        )
        .bind(province)
        .fetch_all(&self.pool)
        .await?;

        self.cache.put(&key, &areas).await;
        Ok(areas)
    }

    /// Register a coverage area (admin surface)
    pub async fn create_area(&self, request: CreateCoverageAreaRequest) -> Result<CoverageArea> {
        use validator::Validate;
        request
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;

        if request.base_delivery_fee < rust_decimal::Decimal::ZERO
            || request.per_km_rate < rust_decimal::Decimal::ZERO
            || request.free_delivery_threshold < rust_decimal::Decimal::ZERO
        {
            return Err(Error::validation("pricing fields must not be negative"));
        }

        let area = sqlx::query_as::<_, CoverageArea>(
            r#"
            INSERT INTO coverage_areas (
                id, province, district, subdistrict, postal_code,
                is_self_delivery_area, delivery_route, delivery_zone,
                base_delivery_fee, per_km_rate, free_delivery_threshold,
                standard_hours, express_hours, same_day_available,
                max_daily_capacity, priority_order, auto_assign, is_active
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, TRUE)
            RETURNING *
            "#,
        )
        .bind(uuid::Uuid::new_v4())
        .bind(&request.province)
        .bind(request.district.as_ref())
        .bind(request.subdistrict.as_ref())
        .bind(request.postal_code.as_ref())
        .bind(request.is_self_delivery_area)
        .bind(request.delivery_route.as_ref())
        .bind(request.delivery_zone.as_ref())
        .bind(request.base_delivery_fee)
        .bind(request.per_km_rate)
        .bind(request.free_delivery_threshold)
        .bind(request.standard_hours)
        .bind(request.express_hours)
        .bind(request.same_day_available)
        .bind(request.max_daily_capacity)
        .bind(request.priority_order)
        .bind(request.auto_assign)
        .fetch_one(&self.pool)
        .await?;

        self.cache.invalidate(&cache::coverage_key(&request.province)).await;
        Ok(area)
    }

    /// Areas for a province, admin listing
    pub async fn list_areas(&self, province: &str) -> Result<Vec<CoverageArea>> {
        self.candidates(province).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn area(province: &str) -> CoverageArea {
        CoverageArea {
            id: Uuid::new_v4(),
            province: province.to_string(),
            district: None,
            subdistrict: None,
            postal_code: None,
            is_self_delivery_area: false,
            delivery_route: None,
            delivery_zone: None,
            base_delivery_fee: dec!(50),
            per_km_rate: dec!(5),
            free_delivery_threshold: Decimal::ZERO,
            standard_hours: 48,
            express_hours: None,
            same_day_available: false,
            max_daily_capacity: 100,
            priority_order: 100,
            auto_assign: true,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_postal_match_beats_province_wildcard() {
        let mut a1 = area("BKK");
        a1.postal_code = Some("10110".to_string());
        a1.priority_order = 1;
        a1.is_self_delivery_area = true;
        a1.delivery_route = Some("R1".to_string());

        let mut a2 = area("BKK");
        a2.priority_order = 5;

        let query = CoverageQuery::province("BKK").with_postal_code("10110");

        assert_eq!(score(&a1, &query), Some(9));
        assert_eq!(score(&a2, &query), Some(1));

        let candidates = vec![a2.clone(), a1.clone()];
        let best = best_match(&candidates, &query).unwrap();
        assert_eq!(best.id, a1.id);
    }

    #[test]
    fn test_mismatched_field_disqualifies() {
        let mut pinned = area("BKK");
        pinned.district = Some("Watthana".to_string());

        let query = CoverageQuery::province("BKK").with_district("Bang Rak");
        assert_eq!(score(&pinned, &query), None);

        // An area more specific than the query cannot be confirmed either
        let vague_query = CoverageQuery::province("BKK");
        assert_eq!(score(&pinned, &vague_query), None);
    }

    #[test]
    fn test_unknown_province_matches_nothing() {
        let candidates = vec![area("BKK"), area("Chiang Mai")];
        let query = CoverageQuery::province("Phuket");
        assert!(best_match(&candidates, &query).is_none());
    }

    #[test]
    fn test_inactive_area_skipped() {
        let mut inactive = area("BKK");
        inactive.is_active = false;

        let query = CoverageQuery::province("BKK");
        assert_eq!(score(&inactive, &query), None);
    }

    #[test]
    fn test_full_specificity_scores_fifteen() {
        let mut a = area("BKK");
        a.district = Some("Watthana".to_string());
        a.subdistrict = Some("Khlong Toei Nuea".to_string());
        a.postal_code = Some("10110".to_string());

        let query = CoverageQuery::province("BKK")
            .with_district("Watthana")
            .with_subdistrict("Khlong Toei Nuea")
            .with_postal_code("10110");

        assert_eq!(score(&a, &query), Some(15));
    }

    #[test]
    fn test_tie_breaks() {
        // Same score: lower priority wins
        let mut low_priority = area("BKK");
        low_priority.priority_order = 1;
        let mut high_priority = area("BKK");
        high_priority.priority_order = 5;

        let query = CoverageQuery::province("BKK");
        let candidates = vec![high_priority.clone(), low_priority.clone()];
        assert_eq!(best_match(&candidates, &query).unwrap().id, low_priority.id);

        // Same score and priority: self-delivery preferred
        let mut fleet = area("BKK");
        fleet.is_self_delivery_area = true;
        let courier = area("BKK");
        let candidates = vec![courier.clone(), fleet.clone()];
        assert_eq!(best_match(&candidates, &query).unwrap().id, fleet.id);

        // Same score, priority and method: oldest wins
        let mut old = area("BKK");
        old.created_at = Utc::now() - Duration::days(30);
        let new = area("BKK");
        let candidates = vec![new.clone(), old.clone()];
        assert_eq!(best_match(&candidates, &query).unwrap().id, old.id);
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let mut a1 = area("BKK");
        a1.postal_code = Some("10110".to_string());
        let mut a2 = area("BKK");
        a2.subdistrict = Some("Khlong Toei Nuea".to_string());
        let a3 = area("BKK");

        let query = CoverageQuery::province("BKK")
            .with_subdistrict("Khlong Toei Nuea")
            .with_postal_code("10110");

        let candidates = vec![a1.clone(), a2.clone(), a3.clone()];
        let first = best_match(&candidates, &query).unwrap().id;
        for _ in 0..10 {
            assert_eq!(best_match(&candidates, &query).unwrap().id, first);
        }
    }

    #[test]
    fn test_case_insensitive_matching() {
        let mut a = area("bkk");
        a.district = Some("WATTHANA".to_string());

        let query = CoverageQuery::province("BKK").with_district("watthana");
        assert_eq!(score(&a, &query), Some(3));
    }
}
