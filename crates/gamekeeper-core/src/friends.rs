use std::sync::Arc;

use gamekeeper_db::models::{FriendRequestRow, PeerRequestRow};
use gamekeeper_db::{Database, RequestFilter};
use gamekeeper_types::api::RespondAction;
use gamekeeper_types::models::{
    Friend, FriendRequestStatus, FriendRequestView, FriendshipStatus, RequestEntry, SearchHit,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::convert;
use crate::error::{ServiceError, ServiceResult};
use crate::Caller;

pub const DEFAULT_SEARCH_LIMIT: u32 = 10;
pub const MAX_SEARCH_LIMIT: u32 = 50;
pub const MIN_QUERY_LEN: usize = 2;

/// Both halves of the caller's request inbox.
#[derive(Debug, Default)]
pub struct RequestLists {
    pub received: Vec<RequestEntry>,
    pub sent: Vec<RequestEntry>,
}

#[derive(Clone)]
pub struct FriendService {
    db: Arc<Database>,
    clock: Arc<dyn Clock>,
}

impl FriendService {
    pub fn new(db: Arc<Database>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn send_request(&self, caller: Caller, to_user_id: Uuid) -> ServiceResult<FriendRequestView> {
        if caller.user_id == to_user_id {
            return Err(ServiceError::validation(
                "You cannot send a friend request to yourself",
            ));
        }

        let from = caller.id();
        let to = to_user_id.to_string();
        if self.db.get_user_by_id(&to)?.is_none() {
            return Err(ServiceError::not_found("User not found"));
        }
        if self.db.find_request_between(&from, &to)?.is_some() {
            return Err(ServiceError::conflict(
                "A friend request already exists between these users",
            ));
        }

        let id = Uuid::new_v4().to_string();
        let outcome = self
            .db
            .insert_friend_request(&id, &from, &to, self.clock.now())?;
        if !outcome.applied() {
            warn!(%from, %to, "Concurrent friend request lost the race");
            return Err(ServiceError::conflict(
                "A friend request already exists between these users",
            ));
        }

        info!(request_id = %id, %from, %to, "Friend request sent");
        self.request_view(&id)
    }

    /// Accepts or rejects a PENDING request addressed to the caller. Anything
    /// else, including a request the caller sent, is reported as not found.
    pub fn respond(
        &self,
        caller: Caller,
        request_id: Uuid,
        action: RespondAction,
    ) -> ServiceResult<FriendRequestView> {
        let status = match action {
            RespondAction::Accept => FriendRequestStatus::Accepted,
            RespondAction::Reject => FriendRequestStatus::Rejected,
        };
        let id = request_id.to_string();
        let outcome = self.db.respond_to_friend_request(
            &id,
            &caller.id(),
            status.as_str(),
            self.clock.now(),
        )?;
        if !outcome.applied() {
            return Err(ServiceError::not_found(
                "Friend request not found or already processed",
            ));
        }

        info!(request_id = %id, %status, by = %caller.user_id, "Friend request answered");
        self.request_view(&id)
    }

    /// Everyone the caller has an accepted request with, most recently
    /// befriended first.
    pub fn list_friends(&self, caller: Caller) -> ServiceResult<Vec<Friend>> {
        self.db
            .friend_requests_for(&caller.id(), RequestFilter::Accepted)?
            .into_iter()
            .map(|PeerRequestRow { request, peer }| {
                Ok(Friend {
                    id: convert::parse_id(&peer.id)?,
                    username: peer.username,
                    email: peer.email,
                    is_private: peer.is_private,
                    created_at: peer.created_at,
                    friendship_date: request.updated_at,
                })
            })
            .collect()
    }

    pub fn list_requests(&self, caller: Caller) -> ServiceResult<RequestLists> {
        let user_id = caller.id();
        Ok(RequestLists {
            received: self.entries(&user_id, RequestFilter::ReceivedPending)?,
            sent: self.entries(&user_id, RequestFilter::Sent)?,
        })
    }

    /// Finds onboarded users whose username or email contains `query`, each
    /// tagged with where the caller stands with them.
    pub fn search(
        &self,
        caller: Caller,
        query: &str,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<SearchHit>> {
        let needle = query.trim();
        if needle.chars().count() < MIN_QUERY_LEN {
            return Err(ServiceError::Validation(format!(
                "Search query must be at least {MIN_QUERY_LEN} characters"
            )));
        }
        let limit = limit
            .unwrap_or(DEFAULT_SEARCH_LIMIT)
            .clamp(1, MAX_SEARCH_LIMIT);

        let user_id = caller.id();
        self.db
            .search_users(&user_id, needle, limit)?
            .into_iter()
            .map(|user| {
                let request = self.db.find_request_between(&user_id, &user.id)?;
                Ok(SearchHit {
                    id: convert::parse_id(&user.id)?,
                    friendship_status: friendship_status(&user_id, request.as_ref())?,
                    username: user.username,
                    email: user.email,
                    is_private: user.is_private,
                    created_at: user.created_at,
                })
            })
            .collect()
    }

    /// Sent and received requests in the full `FriendRequestView` shape.
    pub(crate) fn export_requests(
        &self,
        user_id: &str,
    ) -> ServiceResult<(Vec<FriendRequestView>, Vec<FriendRequestView>)> {
        let me = self
            .db
            .get_user_by_id(user_id)?
            .ok_or_else(|| ServiceError::not_found("User not found"))?;
        let me = convert::user_summary(&me)?;

        let mut sent = Vec::new();
        for row in self.db.friend_requests_for(user_id, RequestFilter::Sent)? {
            sent.push(FriendRequestView {
                id: convert::parse_id(&row.request.id)?,
                status: convert::request_status(&row.request)?,
                from_user: me.clone(),
                to_user: convert::user_summary(&row.peer)?,
                created_at: row.request.created_at,
                updated_at: row.request.updated_at,
            });
        }

        let mut received = Vec::new();
        for row in self.db.friend_requests_for(user_id, RequestFilter::Received)? {
            received.push(FriendRequestView {
                id: convert::parse_id(&row.request.id)?,
                status: convert::request_status(&row.request)?,
                from_user: convert::user_summary(&row.peer)?,
                to_user: me.clone(),
                created_at: row.request.created_at,
                updated_at: row.request.updated_at,
            });
        }

        Ok((sent, received))
    }

    fn entries(&self, user_id: &str, filter: RequestFilter) -> ServiceResult<Vec<RequestEntry>> {
        self.db
            .friend_requests_for(user_id, filter)?
            .iter()
            .map(|row| {
                Ok(RequestEntry {
                    id: convert::parse_id(&row.request.id)?,
                    status: convert::request_status(&row.request)?,
                    created_at: row.request.created_at,
                    user: convert::public_user(&row.peer)?,
                })
            })
            .collect()
    }

    fn request_view(&self, id: &str) -> ServiceResult<FriendRequestView> {
        let row = self
            .db
            .get_friend_request(id)?
            .ok_or_else(|| ServiceError::not_found("Friend request not found"))?;
        let from = self
            .db
            .get_user_by_id(&row.from_user_id)?
            .ok_or_else(|| anyhow::anyhow!("sender of {id} is missing"))?;
        let to = self
            .db
            .get_user_by_id(&row.to_user_id)?
            .ok_or_else(|| anyhow::anyhow!("recipient of {id} is missing"))?;

        Ok(FriendRequestView {
            id: convert::parse_id(&row.id)?,
            status: convert::request_status(&row)?,
            from_user: convert::user_summary(&from)?,
            to_user: convert::user_summary(&to)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Where `me` stands with the other party of `request`.
fn friendship_status(
    me: &str,
    request: Option<&FriendRequestRow>,
) -> ServiceResult<FriendshipStatus> {
    let Some(request) = request else {
        return Ok(FriendshipStatus::None);
    };
    Ok(match convert::request_status(request)? {
        FriendRequestStatus::Accepted => FriendshipStatus::Accepted,
        FriendRequestStatus::Rejected => FriendshipStatus::Rejected,
        FriendRequestStatus::Pending if request.from_user_id == me => FriendshipStatus::Pending,
        FriendRequestStatus::Pending => FriendshipStatus::PendingReceived,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::Duration;
    use std::collections::HashSet;

    struct Fixture {
        service: FriendService,
        clock: Arc<ManualClock>,
        ann: Caller,
        ben: Caller,
        cat: Caller,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let clock = Arc::new(ManualClock::new("2026-05-01T09:00:00Z".parse().unwrap()));
        let mut callers = Vec::new();
        for name in ["ann", "ben", "cat"] {
            let id = Uuid::new_v4();
            db.create_user(&id.to_string(), &format!("{name}@example.com"), None, clock.now())
                .unwrap();
            db.complete_onboarding(&id.to_string(), name, clock.now())
                .unwrap();
            callers.push(Caller::new(id));
        }
        Fixture {
            service: FriendService::new(db, clock.clone()),
            clock,
            ann: callers[0],
            ben: callers[1],
            cat: callers[2],
        }
    }

    #[test]
    fn self_requests_are_rejected() {
        let f = fixture();
        let err = f.service.send_request(f.ann, f.ann.user_id).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn unknown_target_is_not_found() {
        let f = fixture();
        let err = f.service.send_request(f.ann, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn duplicates_conflict_in_either_direction() {
        let f = fixture();
        let sent = f.service.send_request(f.ann, f.ben.user_id).unwrap();
        assert_eq!(sent.status, FriendRequestStatus::Pending);
        assert_eq!(sent.from_user.id, f.ann.user_id);
        assert_eq!(sent.to_user.id, f.ben.user_id);

        for (from, to) in [(f.ann, f.ben), (f.ben, f.ann)] {
            let err = f.service.send_request(from, to.user_id).unwrap_err();
            assert!(matches!(err, ServiceError::Conflict(_)));
        }
    }

    #[test]
    fn only_the_recipient_may_respond_and_only_once() {
        let f = fixture();
        let sent = f.service.send_request(f.ann, f.ben.user_id).unwrap();

        let err = f
            .service
            .respond(f.ann, sent.id, RespondAction::Accept)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        let err = f
            .service
            .respond(f.cat, sent.id, RespondAction::Accept)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let accepted = f
            .service
            .respond(f.ben, sent.id, RespondAction::Accept)
            .unwrap();
        assert_eq!(accepted.status, FriendRequestStatus::Accepted);

        let err = f
            .service
            .respond(f.ben, sent.id, RespondAction::Reject)
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn friendship_is_symmetric() {
        let f = fixture();
        let r1 = f.service.send_request(f.ann, f.ben.user_id).unwrap();
        let r2 = f.service.send_request(f.cat, f.ann.user_id).unwrap();
        f.service.respond(f.ben, r1.id, RespondAction::Accept).unwrap();
        f.clock.advance(Duration::minutes(5));
        f.service.respond(f.ann, r2.id, RespondAction::Accept).unwrap();

        let ids = |caller| -> HashSet<Uuid> {
            f.service
                .list_friends(caller)
                .unwrap()
                .into_iter()
                .map(|fr| fr.id)
                .collect()
        };
        assert_eq!(ids(f.ann), HashSet::from([f.ben.user_id, f.cat.user_id]));
        assert_eq!(ids(f.ben), HashSet::from([f.ann.user_id]));
        assert_eq!(ids(f.cat), HashSet::from([f.ann.user_id]));

        let ann_friends = f.service.list_friends(f.ann).unwrap();
        assert_eq!(ann_friends[0].id, f.cat.user_id);
        assert_eq!(ann_friends[0].friendship_date, f.clock.now());
    }

    #[test]
    fn request_lists_split_received_and_sent() {
        let f = fixture();
        f.service.send_request(f.ann, f.ben.user_id).unwrap();
        let from_cat = f.service.send_request(f.cat, f.ann.user_id).unwrap();

        let lists = f.service.list_requests(f.ann).unwrap();
        assert_eq!(lists.received.len(), 1);
        assert_eq!(lists.received[0].user.id, f.cat.user_id);
        assert_eq!(lists.sent.len(), 1);
        assert_eq!(lists.sent[0].user.id, f.ben.user_id);

        f.service
            .respond(f.ann, from_cat.id, RespondAction::Reject)
            .unwrap();
        let lists = f.service.list_requests(f.ann).unwrap();
        assert!(lists.received.is_empty());
    }

    #[test]
    fn search_validates_and_annotates() {
        let f = fixture();
        assert!(matches!(
            f.service.search(f.ann, " b ", None).unwrap_err(),
            ServiceError::Validation(_)
        ));

        f.service.send_request(f.ann, f.ben.user_id).unwrap();
        f.service.send_request(f.cat, f.ann.user_id).unwrap();

        let hits = f.service.search(f.ann, "example", None).unwrap();
        let status_of = |id: Uuid| {
            hits.iter()
                .find(|h| h.id == id)
                .map(|h| h.friendship_status)
                .unwrap()
        };
        assert_eq!(hits.len(), 2);
        assert_eq!(status_of(f.ben.user_id), FriendshipStatus::Pending);
        assert_eq!(status_of(f.cat.user_id), FriendshipStatus::PendingReceived);
        assert!(hits.iter().all(|h| h.id != f.ann.user_id));

        let capped = f.service.search(f.ann, "example", Some(1)).unwrap();
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].username.as_deref(), Some("ben"));
    }
}
