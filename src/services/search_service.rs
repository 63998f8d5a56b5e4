use std::sync::Arc;

use crate::config::SearchConfig;
use crate::error::AppResult;
use crate::models::{SearchHit, SearchQuery, SearchResult};
use crate::search::{geocode_location, paginate, rank_by_distance, ContainerFilter, RadiusPolicy};

use super::ContainerService;

/// Filter, distance ranking and paging over the container catalog.
pub struct SearchService {
    containers: Arc<ContainerService>,
    policy: RadiusPolicy,
    page_size: u32,
}

impl SearchService {
    pub fn new(containers: Arc<ContainerService>, config: &SearchConfig) -> Self {
        Self {
            containers,
            policy: RadiusPolicy::from(config),
            page_size: config.page_size,
        }
    }

    /// Never fails: a datastore error is logged and reported as an empty result.
    pub async fn search(&self, query: &SearchQuery) -> SearchResult {
        match self.try_search(query).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!("Container search failed: {}", e);
                SearchResult::empty(query.page)
            }
        }
    }

    async fn try_search(&self, query: &SearchQuery) -> AppResult<SearchResult> {
        let origin = query.origin.or_else(|| {
            let location = query.location.as_deref()?;
            let geocoded = geocode_location(location);
            if geocoded.is_none() {
                tracing::debug!("Could not geocode location {:?}", location);
            }
            geocoded.map(|g| g.coordinate())
        });

        let filter = ContainerFilter::from(query);
        let candidates = self.containers.find_containers(&filter, query.sort).await?;

        let (hits, using_fallback, effective_radius_miles) = match origin {
            Some(origin) => {
                let ranking = rank_by_distance(candidates, origin, query.radius_miles, &self.policy);
                let hits = ranking
                    .hits
                    .into_iter()
                    .map(|(container, distance)| SearchHit {
                        container,
                        distance_miles: Some(distance),
                    })
                    .collect();
                (hits, ranking.using_fallback, Some(ranking.effective_radius_miles))
            }
            None => {
                let hits = candidates
                    .into_iter()
                    .map(|container| SearchHit {
                        container,
                        distance_miles: None,
                    })
                    .collect();
                (hits, false, None)
            }
        };

        let page = paginate(hits, query.page, self.page_size);
        tracing::debug!(
            "Search matched {} containers, returning page {} of {}",
            page.total_results,
            page.current_page,
            page.total_pages
        );

        Ok(SearchResult {
            containers: page.items,
            total_results: page.total_results,
            total_pages: page.total_pages,
            current_page: page.current_page,
            using_fallback,
            distance_applied: origin.is_some(),
            effective_radius_miles,
            origin,
        })
    }
}
