//! Wire DTOs for the Odie POI backend.
//!
//! Responses decode into these DTOs first and map into domain records in
//! one pass; requests are built from domain records the same way.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ports::{PoiCreation, PoiListing, PutRequest, PutResponse, UploadTarget};
use crate::domain::{Poi, PoiClientId, PoiVote, RecognitionEvent};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) struct PoiDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) client_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) server_id: Option<String>,
    pub(super) name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) first_comment: Option<String>,
}

impl PoiDto {
    pub(super) fn from_domain(poi: &Poi) -> Self {
        Self {
            client_id: Some(poi.client_id.0),
            server_id: poi.server_id.clone(),
            name: poi.name.clone(),
            first_comment: poi.first_comment.clone(),
        }
    }

    /// Backend POIs always carry a server id; the client id is derived from
    /// it when the backend did not echo one.
    fn into_domain(self) -> Result<Poi, String> {
        let server_id = self
            .server_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| format!("POI {:?} has no serverId", self.name))?;
        let client_id = self
            .client_id
            .map_or_else(|| PoiClientId::from_server_id(&server_id), PoiClientId);
        let poi = Poi::server_known(client_id, server_id, self.name);
        Ok(match self.first_comment {
            Some(comment) => poi.with_first_comment(comment),
            None => poi,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PoiListingDto {
    #[serde(default)]
    pub(super) pois: Vec<PoiDto>,
    #[serde(default)]
    pub(super) hit_me_again_in: u64,
    #[serde(default)]
    pub(super) s3_bucket: Option<String>,
    #[serde(default)]
    pub(super) s3_folder: Option<String>,
}

impl PoiListingDto {
    pub(super) fn into_domain(self) -> Result<PoiListing, String> {
        let pois = self
            .pois
            .into_iter()
            .map(PoiDto::into_domain)
            .collect::<Result<Vec<_>, _>>()?;
        let upload_target = self
            .s3_bucket
            .filter(|bucket| !bucket.trim().is_empty())
            .map(|bucket| UploadTarget::new(bucket, self.s3_folder.unwrap_or_default()));
        Ok(PoiListing {
            pois,
            hit_me_again_in: self.hit_me_again_in,
            upload_target,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct VoteDto {
    pub(super) poi: PoiDto,
    pub(super) score: f32,
}

impl VoteDto {
    fn from_domain(vote: &PoiVote) -> Self {
        Self {
            poi: PoiDto::from_domain(&vote.poi),
            score: vote.score,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct RecognitionEventDto {
    pub(super) snapshot_id: i64,
    pub(super) image_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) poi: Option<PoiDto>,
    pub(super) votes: Vec<VoteDto>,
    pub(super) device_id: String,
    pub(super) timestamp: DateTime<Utc>,
}

impl RecognitionEventDto {
    fn from_domain(event: &RecognitionEvent) -> Self {
        Self {
            snapshot_id: event.snapshot_id.0,
            image_id: event.image_id.clone(),
            poi: event.poi.as_ref().map(PoiDto::from_domain),
            votes: event.votes.iter().map(VoteDto::from_domain).collect(),
            device_id: event.device_id.clone(),
            timestamp: event.captured_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PutRequestDto {
    pub(super) pois: Vec<PoiDto>,
    pub(super) recognition_events: Vec<RecognitionEventDto>,
}

impl PutRequestDto {
    pub(super) fn from_domain(request: &PutRequest) -> Self {
        Self {
            pois: request.pois.iter().map(PoiDto::from_domain).collect(),
            recognition_events: request
                .recognition_events
                .iter()
                .map(RecognitionEventDto::from_domain)
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PoiCreationDto {
    pub(super) client_id: u64,
    pub(super) server_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct PutResponseDto {
    #[serde(default)]
    pub(super) created: Vec<PoiCreationDto>,
    #[serde(default)]
    pub(super) pois: Vec<PoiDto>,
}

impl PutResponseDto {
    pub(super) fn into_domain(self) -> Result<PutResponse, String> {
        let created = self
            .created
            .into_iter()
            .map(|created| {
                if created.server_id.trim().is_empty() {
                    return Err(format!("client id {} created without serverId", created.client_id));
                }
                Ok(PoiCreation {
                    client_id: PoiClientId(created.client_id),
                    server_id: created.server_id,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let pois = self
            .pois
            .into_iter()
            .map(PoiDto::into_domain)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PutResponse { created, pois })
    }
}
