use chrono::{DateTime, Utc};
use log::info;
use thiserror::Error;

use crate::util::random_string;
use crate::{
    CoreContext, DatabaseError, NewShow, PrivateShowData, SettlementOutcome, ShowSettlement,
    ShowStatus, UserData, UserRole,
};

/// Half of the settled cost goes to the platform, the remainder to the model.
/// On odd amounts the extra token goes to the platform.
fn split_cost(total_cost: i64) -> (i64, i64) {
    let platform_fee = (total_cost + 1) / 2;
    (platform_fee, total_cost - platform_fee)
}

/// Whole minutes between start and end, rounded up, never less than one.
/// Every started show bills at least one minute.
fn billable_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i64 {
    let seconds = (ended_at - started_at).num_seconds().max(0);
    ((seconds + 59) / 60).max(1)
}

/// Runs the private show lifecycle and its token accounting. Every show that
/// reaches `active` is settled exactly once.
pub struct PrivateShowLedger {
    context: CoreContext,
}

#[derive(Debug, Error)]
pub enum ShowError {
    #[error("Only viewers can request private shows")]
    NotAViewer,
    #[error("Only models can accept private shows")]
    NotAModel,
    #[error("Model not found")]
    ModelNotFound,
    #[error("Model is currently unavailable")]
    ModelUnavailable,
    #[error("Private show not found")]
    ShowNotFound,
    #[error("Not authorized for this private show")]
    NotAParty,
    #[error("Insufficient tokens, at least {required} required")]
    InsufficientFunds { required: i64 },
    #[error("Private show is not in the {expected} state")]
    InvalidState { expected: &'static str },
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// The outcome of ending a show
#[derive(Debug)]
pub struct ShowReceipt {
    pub show: PrivateShowData,
    /// False when the viewer's balance did not cover the cost
    pub charged: bool,
    pub duration_minutes: i64,
    pub total_cost: i64,
    /// Absent on an unpaid show
    pub model_earnings: Option<i64>,
}

impl PrivateShowLedger {
    pub fn new(context: &CoreContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Opens a show request towards a model. The viewer must hold at least
    /// one minute's worth of tokens, so a show that is accepted can always
    /// bill its minimum.
    pub async fn request(
        &self,
        viewer: &UserData,
        model_id: &str,
        rate_per_minute: i64,
    ) -> Result<PrivateShowData, ShowError> {
        if viewer.role != UserRole::Viewer {
            return Err(ShowError::NotAViewer);
        }

        let db = &self.context.database;

        let model = db.model_by_user_id(model_id).await.map_err(|e| match e {
            e if e.is_not_found() => ShowError::ModelNotFound,
            e => ShowError::Database(e),
        })?;

        if !model.is_available {
            return Err(ShowError::ModelUnavailable);
        }

        let profile = db.viewer_by_user_id(&viewer.id).await.map_err(|e| match e {
            e if e.is_not_found() => ShowError::InsufficientFunds {
                required: rate_per_minute,
            },
            e => ShowError::Database(e),
        })?;

        if profile.token_balance < rate_per_minute {
            return Err(ShowError::InsufficientFunds {
                required: rate_per_minute,
            });
        }

        let show = db
            .create_show(NewShow {
                id: random_string(32),
                viewer_id: viewer.id.clone(),
                model_id: model_id.to_string(),
                rate_per_minute,
                created_at: Utc::now(),
            })
            .await?;

        info!(
            "Private show {} requested by viewer {} towards model {model_id}",
            show.id, viewer.id
        );

        Ok(show)
    }

    /// The model accepts a requested show, which starts the billing clock
    pub async fn accept(&self, show_id: &str, model: &UserData) -> Result<PrivateShowData, ShowError> {
        if model.role != UserRole::Model {
            return Err(ShowError::NotAModel);
        }

        let db = &self.context.database;

        let show = db.show_by_id(show_id).await.map_err(|e| match e {
            e if e.is_not_found() => ShowError::ShowNotFound,
            e => ShowError::Database(e),
        })?;

        if show.model_id != model.id {
            return Err(ShowError::NotAParty);
        }

        if show.status != ShowStatus::Requested {
            return Err(ShowError::InvalidState {
                expected: "requested",
            });
        }

        let activated = db
            .activate_show(show_id, Utc::now())
            .await?
            .ok_or(ShowError::InvalidState {
                expected: "requested",
            })?;

        info!("Private show {show_id} accepted by model {}", model.id);

        Ok(activated)
    }

    /// Ends an active show and settles it. Either side can end it. Concurrent
    /// ends resolve to a single settlement, the loser gets an invalid state
    /// error.
    pub async fn end(&self, show_id: &str, user: &UserData) -> Result<ShowReceipt, ShowError> {
        let db = &self.context.database;

        let show = db.show_by_id(show_id).await.map_err(|e| match e {
            e if e.is_not_found() => ShowError::ShowNotFound,
            e => ShowError::Database(e),
        })?;

        if !show.is_party(&user.id) {
            return Err(ShowError::NotAParty);
        }

        if show.status != ShowStatus::Active {
            return Err(ShowError::InvalidState { expected: "active" });
        }

        let ended_at = Utc::now();
        let started_at = show.started_at.unwrap_or(show.created_at);

        let duration_minutes = billable_minutes(started_at, ended_at);
        let total_cost = duration_minutes * show.rate_per_minute;
        let (platform_fee, model_earnings) = split_cost(total_cost);

        let outcome = db
            .settle_show(ShowSettlement {
                show_id: show_id.to_string(),
                viewer_id: show.viewer_id.clone(),
                model_id: show.model_id.clone(),
                ended_at,
                duration_minutes,
                total_cost,
                platform_fee,
                model_earnings,
            })
            .await?;

        match outcome {
            SettlementOutcome::Settled(show) => {
                info!(
                    "Private show {show_id} settled: {total_cost} tokens over {duration_minutes} minutes"
                );

                Ok(ShowReceipt {
                    show,
                    charged: true,
                    duration_minutes,
                    total_cost,
                    model_earnings: Some(model_earnings),
                })
            }
            SettlementOutcome::InsufficientFunds(show) => {
                info!("Private show {show_id} ended unpaid, balance below {total_cost}");

                Ok(ShowReceipt {
                    show,
                    charged: false,
                    duration_minutes,
                    total_cost: 0,
                    model_earnings: None,
                })
            }
            SettlementOutcome::AlreadySettled => {
                Err(ShowError::InvalidState { expected: "active" })
            }
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::{Duration, Utc};

    use crate::testing::{model_user, test_core, viewer_user, TestCore};
    use crate::{Database, ShowStatus, TransactionKind, ViewerProfileData};

    use super::{billable_minutes, split_cost, ShowError};

    #[test]
    fn test_billable_minutes_rounds_up() {
        let start = Utc::now();

        assert_eq!(billable_minutes(start, start + Duration::seconds(30)), 1);
        assert_eq!(billable_minutes(start, start + Duration::seconds(60)), 1);
        assert_eq!(billable_minutes(start, start + Duration::seconds(61)), 2);
        assert_eq!(billable_minutes(start, start + Duration::seconds(121)), 3);
    }

    #[test]
    fn test_billable_minutes_has_a_floor() {
        let start = Utc::now();

        assert_eq!(billable_minutes(start, start), 1);
        // A clock that went backwards still bills the minimum
        assert_eq!(billable_minutes(start, start - Duration::seconds(5)), 1);
    }

    #[test]
    fn test_split_cost_favors_the_platform_on_odd_amounts() {
        assert_eq!(split_cost(40), (20, 20));
        assert_eq!(split_cost(25), (13, 12));
        assert_eq!(split_cost(1), (1, 0));
    }

    #[tokio::test]
    async fn test_request_requires_one_minute_of_tokens() {
        let TestCore { core, db, .. } = test_core();
        let viewer = viewer_user("viewer-1");
        db.add_model(crate::testing::live_model_profile("model-1"));
        db.add_viewer(ViewerProfileData {
            user_id: "viewer-1".to_string(),
            token_balance: 19,
            total_spent: 0,
        });

        let result = core.shows.request(&viewer, "model-1", 20).await;

        assert!(matches!(
            result,
            Err(ShowError::InsufficientFunds { required: 20 })
        ));
    }

    #[tokio::test]
    async fn test_full_show_settles_both_sides() {
        let TestCore { core, db, .. } = test_core();
        let viewer = viewer_user("viewer-1");
        let model = model_user("model-1");
        db.add_model(crate::testing::live_model_profile("model-1"));
        db.add_viewer(ViewerProfileData {
            user_id: "viewer-1".to_string(),
            token_balance: 100,
            total_spent: 0,
        });

        let show = core
            .shows
            .request(&viewer, "model-1", 20)
            .await
            .expect("show is requested");

        core.shows
            .accept(&show.id, &model)
            .await
            .expect("show is accepted");

        let receipt = core.shows.end(&show.id, &viewer).await.expect("show settles");

        assert!(receipt.charged);
        assert_eq!(receipt.duration_minutes, 1);
        assert_eq!(receipt.total_cost, 20);
        assert_eq!(receipt.model_earnings, Some(10));
        assert_eq!(receipt.show.status, ShowStatus::Completed);

        let viewer_profile = db
            .viewer_by_user_id("viewer-1")
            .await
            .expect("viewer exists");
        assert_eq!(viewer_profile.token_balance, 80);
        assert_eq!(viewer_profile.total_spent, 20);

        let model_profile = db
            .model_by_user_id("model-1")
            .await
            .expect("model exists");
        assert_eq!(model_profile.available_balance, 10);
        assert_eq!(model_profile.total_earnings, 10);
        assert_eq!(model_profile.total_shows, 1);

        let transactions = db.transactions();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].kind, TransactionKind::PrivateShow);
        assert_eq!(transactions[0].tokens, 20);
        assert_eq!(transactions[1].kind, TransactionKind::Earning);
        assert_eq!(transactions[1].tokens, 10);
    }

    #[tokio::test]
    async fn test_insufficient_balance_ends_the_show_unpaid() {
        let TestCore { core, db, .. } = test_core();
        let viewer = viewer_user("viewer-1");
        let model = model_user("model-1");
        db.add_model(crate::testing::live_model_profile("model-1"));
        db.add_viewer(ViewerProfileData {
            user_id: "viewer-1".to_string(),
            token_balance: 20,
            total_spent: 0,
        });

        let show = core
            .shows
            .request(&viewer, "model-1", 20)
            .await
            .expect("show is requested");

        // Start the show 90 seconds in the past so two minutes become
        // billable, more than the balance covers
        db.activate_show(&show.id, Utc::now() - Duration::seconds(90))
            .await
            .expect("show activates in the past");

        let receipt = core.shows.end(&show.id, &model).await.expect("show ends");

        assert!(!receipt.charged);
        assert_eq!(receipt.duration_minutes, 2);
        assert_eq!(receipt.total_cost, 0);
        assert_eq!(receipt.model_earnings, None);
        assert_eq!(receipt.show.status, ShowStatus::EndedInsufficientFunds);

        // Nothing moved on either side
        let viewer_profile = db
            .viewer_by_user_id("viewer-1")
            .await
            .expect("viewer exists");
        assert_eq!(viewer_profile.token_balance, 20);
        assert_eq!(viewer_profile.total_spent, 0);

        let model_profile = db
            .model_by_user_id("model-1")
            .await
            .expect("model exists");
        assert_eq!(model_profile.available_balance, 0);
        assert!(db.transactions().is_empty());
    }

    #[tokio::test]
    async fn test_accept_by_another_model_is_forbidden() {
        let TestCore { core, db, .. } = test_core();
        let viewer = viewer_user("viewer-1");
        let other_model = model_user("model-2");
        db.add_model(crate::testing::live_model_profile("model-1"));
        db.add_viewer(ViewerProfileData {
            user_id: "viewer-1".to_string(),
            token_balance: 100,
            total_spent: 0,
        });

        let show = core
            .shows
            .request(&viewer, "model-1", 20)
            .await
            .expect("show is requested");

        let result = core.shows.accept(&show.id, &other_model).await;
        assert!(matches!(result, Err(ShowError::NotAParty)));
    }

    #[tokio::test]
    async fn test_ending_twice_settles_once() {
        let TestCore { core, db, .. } = test_core();
        let viewer = viewer_user("viewer-1");
        let model = model_user("model-1");
        db.add_model(crate::testing::live_model_profile("model-1"));
        db.add_viewer(ViewerProfileData {
            user_id: "viewer-1".to_string(),
            token_balance: 100,
            total_spent: 0,
        });

        let show = core
            .shows
            .request(&viewer, "model-1", 20)
            .await
            .expect("show is requested");

        core.shows
            .accept(&show.id, &model)
            .await
            .expect("show is accepted");

        let first = core.shows.end(&show.id, &viewer).await;
        let second = core.shows.end(&show.id, &model).await;

        assert!(first.is_ok());
        assert!(matches!(
            second,
            Err(ShowError::InvalidState { expected: "active" })
        ));

        // Exactly one debit happened
        let viewer_profile = db
            .viewer_by_user_id("viewer-1")
            .await
            .expect("viewer exists");
        assert_eq!(viewer_profile.token_balance, 80);
        assert_eq!(db.transactions().len(), 2);
    }

    #[tokio::test]
    async fn test_end_by_outsider_is_forbidden() {
        let TestCore { core, db, .. } = test_core();
        let viewer = viewer_user("viewer-1");
        let model = model_user("model-1");
        let outsider = viewer_user("viewer-2");
        db.add_model(crate::testing::live_model_profile("model-1"));
        db.add_viewer(ViewerProfileData {
            user_id: "viewer-1".to_string(),
            token_balance: 100,
            total_spent: 0,
        });

        let show = core
            .shows
            .request(&viewer, "model-1", 20)
            .await
            .expect("show is requested");

        core.shows
            .accept(&show.id, &model)
            .await
            .expect("show is accepted");

        let result = core.shows.end(&show.id, &outsider).await;
        assert!(matches!(result, Err(ShowError::NotAParty)));
    }
}
