use std::collections::BTreeMap;

use rand::seq::SliceRandom as _;
use reqwest::Url;
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::config;
use crate::error::SyncError;
use crate::notifier::Notifier;
use crate::store::{ListingId, NormalizedCar, Store};

const SOURCE: &str = "autoscout24";
const UNKNOWN_MAKE: &str = "Unknown make";
const UNKNOWN_MODEL: &str = "Unknown model";
const UNKNOWN_PRICE: &str = "Unknown price";
const UNKNOWN_IMAGE: &str = "Image not available";
const UNKNOWN_DETAIL: &str = "Unknown";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingsResponse {
    #[serde(default)]
    page_props: Option<PageProps>,
}

#[derive(Debug, Default, Deserialize)]
struct PageProps {
    #[serde(default)]
    listings: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawListing {
    id: ListingId,
    #[serde(default)]
    vehicle: Option<Vehicle>,
    #[serde(default)]
    price: Option<Price>,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default, rename = "vehicleDetails")]
    vehicle_details: Option<Vec<VehicleDetail>>,
}

#[derive(Debug, Default, Deserialize)]
struct Vehicle {
    make: Option<String>,
    model: Option<String>,
    #[serde(rename = "modelVersionInput")]
    model_version: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Price {
    #[serde(rename = "priceFormatted")]
    formatted: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VehicleDetail {
    #[serde(rename = "iconName")]
    icon_name: Option<String>,
    data: Option<String>,
}

/// Polls the discovered endpoint page by page and feeds every listing
/// through normalization into the store.
pub struct SyncEngine {
    client: reqwest::Client,
    store: Store,
    notifier: Notifier,
}

impl SyncEngine {
    pub fn new(store: Store, notifier: Notifier) -> Self {
        Self {
            client: reqwest::Client::new(),
            store,
            notifier,
        }
    }

    /// Fetches every configured page and upserts all listings found,
    /// returning how many of them had never been seen before. Any page
    /// failure aborts the whole call; listings already upserted from
    /// earlier pages stay committed.
    pub async fn sync(&self, endpoint: &Url) -> Result<u64, SyncError> {
        let mut new_car_count = 0;
        for &page in config::PAGES_TO_SCRAPE {
            new_car_count += self.sync_page(endpoint, page).await?;
        }
        info!("Scraping completed. Found {new_car_count} new cars");
        Ok(new_car_count)
    }

    async fn sync_page(&self, endpoint: &Url, page: u32) -> Result<u64, SyncError> {
        info!("Scraping page {page}...");

        let response = self
            .client
            .get(page_url(endpoint, page))
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .timeout(config::REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|source| SyncError::Fetch { page, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status { page, status });
        }

        let body: ListingsResponse = response
            .json()
            .await
            .map_err(|source| SyncError::Decode { page, source })?;
        let listings = body.page_props.unwrap_or_default().listings;
        info!("Found {} listings on page {page}", listings.len());

        let mut new_car_count = 0;
        for listing in listings {
            let listing = match serde_json::from_value::<RawListing>(listing) {
                Ok(listing) => listing,
                Err(e) => {
                    warn!("Error parsing listing: {e}");
                    continue;
                }
            };
            if self.upsert_and_notify(&normalize(listing)).await {
                new_car_count += 1;
            }
        }
        Ok(new_car_count)
    }

    /// Storage faults are downgraded to "not new" so a broken database
    /// never aborts the cycle.
    async fn upsert_and_notify(&self, car: &NormalizedCar) -> bool {
        let is_new = match self.store.upsert(car).await {
            Ok(is_new) => is_new,
            Err(e) => {
                error!("Database insertion error - {e}");
                self.notifier
                    .send_error(&format!(
                        "{} - Database insertion error: {e}",
                        config::BOT_NAME
                    ))
                    .await;
                return false;
            }
        };

        if is_new {
            info!("New car added: {} - {}", car.title, car.price);
            self.notifier
                .send_info(&format!(
                    "New car listing found!\n\n<b>{}</b>\nPrice: {}\nTransmission: {}\n<a href='{}'>View Listing</a>",
                    car.title, car.price, car.transmission, car.link
                ))
                .await;
        }
        is_new
    }
}

fn random_user_agent() -> &'static str {
    config::USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(config::USER_AGENTS[0])
}

/// Swaps the `page` query parameter of the discovered endpoint URL,
/// appending it when the captured URL did not carry one.
fn page_url(endpoint: &Url, page: u32) -> Url {
    let mut url = endpoint.clone();
    let other_pairs: Vec<(String, String)> = endpoint
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        pairs.extend_pairs(other_pairs);
        pairs.append_pair("page", &page.to_string());
    }
    url
}

fn normalize(listing: RawListing) -> NormalizedCar {
    let vehicle = listing.vehicle.unwrap_or_default();
    let make = vehicle.make.unwrap_or_else(|| UNKNOWN_MAKE.to_string());
    let model = vehicle.model.unwrap_or_else(|| UNKNOWN_MODEL.to_string());
    let model_version = vehicle.model_version.unwrap_or_default();
    let title = format!("{make} {model} {model_version}").trim().to_string();

    let price = listing
        .price
        .and_then(|price| price.formatted)
        .unwrap_or_else(|| UNKNOWN_PRICE.to_string());

    let image = listing
        .images
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or_else(|| UNKNOWN_IMAGE.to_string());

    let link = build_listing_url(listing.url.as_deref().unwrap_or(""));

    let features = extract_features(listing.vehicle_details.unwrap_or_default());
    let transmission = features
        .get("transmission")
        .cloned()
        .unwrap_or_else(|| UNKNOWN_DETAIL.to_string());

    NormalizedCar {
        id: listing.id,
        title,
        price,
        link,
        image,
        source: SOURCE.to_string(),
        transmission,
        features,
    }
}

fn extract_features(details: Vec<VehicleDetail>) -> BTreeMap<String, String> {
    details
        .into_iter()
        .filter_map(|detail| {
            detail.icon_name.map(|icon_name| {
                (
                    icon_name,
                    detail
                        .data
                        .unwrap_or_else(|| UNKNOWN_DETAIL.to_string()),
                )
            })
        })
        .collect()
}

fn build_listing_url(listing_url: &str) -> String {
    format!("{}{listing_url}", config::BASE_URL)
}
