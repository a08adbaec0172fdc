//! reqwest implementation of [`BookingApi`]

use super::{error_message, ApiFuture, ApiResult, BookingApi, Envelope, SeatStream};
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::push::seat_snapshots;
use crate::types::{NewReservation, Payment, Reservation, ReservationId, Seat};
use reqwest::{header, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// HTTP client for the booking backend and the payment backend
#[derive(Debug, Clone)]
pub struct HttpBookingApi {
    client: Client,
    booking_url: String,
    payments_url: String,
    request_timeout: Duration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmPaymentBody<'a> {
    reservation_id: &'a ReservationId,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelPaymentBody<'a> {
    reservation_id: &'a ReservationId,
    reason: &'a str,
}

impl HttpBookingApi {
    /// Create a client from configuration
    ///
    /// The request timeout applies per call so the push channel can stay open indefinitely.
    #[must_use]
    pub fn new(config: &ApiConfig) -> Self {
        Self::with_client(Client::new(), config)
    }

    /// Create a client reusing an existing reqwest [`Client`]
    #[must_use]
    pub fn with_client(client: Client, config: &ApiConfig) -> Self {
        Self {
            client,
            booking_url: config.booking_url.trim_end_matches('/').to_string(),
            payments_url: config.payments_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout,
        }
    }

    fn booking(&self, path: &str) -> String {
        format!("{}/{}", self.booking_url, path.trim_start_matches('/'))
    }

    fn payments(&self, path: &str) -> String {
        format!("{}/{}", self.payments_url, path.trim_start_matches('/'))
    }

    /// Send a request and unwrap the `{data}` envelope
    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<Option<T>> {
        let response = request
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        Self::handle_response(response).await
    }

    /// Map a response to its envelope payload or an [`ApiError`]
    async fn handle_response<T: DeserializeOwned>(response: Response) -> ApiResult<Option<T>> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            let fallback = status.canonical_reason().unwrap_or("request rejected");
            return Err(ApiError::Rejected {
                status: status.as_u16(),
                message: error_message(&body, fallback),
            });
        }

        serde_json::from_str::<Envelope<T>>(&body)
            .map(|envelope| envelope.data)
            .map_err(|e| ApiError::ResponseParseFailed(e.to_string()))
    }

    async fn required<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
        self.call(request).await?.ok_or(ApiError::MissingData)
    }
}

impl BookingApi for HttpBookingApi {
    fn health(&self) -> ApiFuture<serde_json::Value> {
        let this = self.clone();
        Box::pin(async move {
            // Health bodies are not enveloped; log whatever the backend says
            let response = this
                .client
                .get(this.booking("/health"))
                .timeout(this.request_timeout)
                .send()
                .await
                .map_err(|e| ApiError::RequestFailed(e.to_string()))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| ApiError::RequestFailed(e.to_string()))?;
            if !status.is_success() {
                return Err(ApiError::Rejected {
                    status: status.as_u16(),
                    message: error_message(&body, "unhealthy"),
                });
            }
            Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
        })
    }

    fn seats(&self) -> ApiFuture<Vec<Seat>> {
        let this = self.clone();
        Box::pin(async move {
            let request = this.client.get(this.booking("/seats"));
            // A snapshot without data means no seats
            Ok(this.call::<Vec<Seat>>(request).await?.unwrap_or_default())
        })
    }

    fn create_reservation(&self, body: NewReservation) -> ApiFuture<Reservation> {
        let this = self.clone();
        Box::pin(async move {
            let request = this.client.post(this.booking("/reservations")).json(&body);
            this.required(request).await
        })
    }

    fn check_payment(&self, reservation_id: ReservationId) -> ApiFuture<bool> {
        let this = self.clone();
        Box::pin(async move {
            let request = this
                .client
                .get(this.payments("/payments"))
                .query(&[("reservation_id", reservation_id.as_str())]);
            this.required(request).await
        })
    }

    fn confirm_payment(&self, reservation_id: ReservationId) -> ApiFuture<Payment> {
        let this = self.clone();
        Box::pin(async move {
            let request = this
                .client
                .post(this.payments("/payments"))
                .json(&ConfirmPaymentBody {
                    reservation_id: &reservation_id,
                });
            this.required(request).await
        })
    }

    fn cancel_payment(&self, reservation_id: ReservationId, reason: String) -> ApiFuture<Payment> {
        let this = self.clone();
        Box::pin(async move {
            let request = this
                .client
                .delete(this.payments("/payments"))
                .json(&CancelPaymentBody {
                    reservation_id: &reservation_id,
                    reason: &reason,
                });
            this.required(request).await
        })
    }

    fn seat_updates(&self) -> ApiFuture<SeatStream> {
        let this = self.clone();
        Box::pin(async move {
            let response = this
                .client
                .get(this.booking("/events"))
                .header(header::ACCEPT, "text/event-stream")
                .send()
                .await
                .map_err(|e| ApiError::StreamFailed(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ApiError::Rejected {
                    status: status.as_u16(),
                    message: error_message(&body, "push channel rejected"),
                });
            }

            Ok(seat_snapshots(response.bytes_stream()))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_are_joined_without_double_slashes() {
        let api = HttpBookingApi::new(&ApiConfig {
            booking_url: "http://localhost:8080/".into(),
            payments_url: "http://localhost:4040".into(),
            request_timeout: Duration::from_secs(1),
        });

        assert_eq!(api.booking("/seats"), "http://localhost:8080/seats");
        assert_eq!(api.payments("payments"), "http://localhost:4040/payments");
    }

    #[test]
    fn test_payment_bodies_use_camel_case() {
        let id = ReservationId::new("R1");
        assert_eq!(
            serde_json::to_value(CancelPaymentBody {
                reservation_id: &id,
                reason: "user cancelled payment",
            })
            .unwrap(),
            serde_json::json!({"reservationId": "R1", "reason": "user cancelled payment"})
        );
    }
}
