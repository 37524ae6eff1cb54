// service/deal_service.rs
use std::{collections::HashMap, sync::Arc, time::Duration};

use bigdecimal::BigDecimal;
use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{
        chatdb,
        db::DBClient,
        dealdb::{self, DealExt, NewDeal, NewReview},
        productdb::{self, ProductExt},
        userdb::UserExt,
    },
    dtos::dealdtos::*,
    models::{
        chatmodels::{Conversation, MessageType},
        dealmodels::*,
        productmodel::{Product, ProductSummary},
        usermodel::User,
    },
    service::{
        error::ServiceError,
        review_aggregator,
        stock_reservation,
    },
    utils::decimal::{is_positive, line_total, to_money},
};

pub const MAX_CANCELLATION_REASON: usize = 500;

/// The commercial terms of a new offer, settled before anything is written.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferTerms {
    pub farmer_id: Uuid,
    pub buyer_id: Uuid,
    pub quantity: i32,
    pub unit_price: BigDecimal,
    pub total_price: BigDecimal,
}

/// Checks who may offer what in a conversation and prices the offer.
pub fn offer_terms(
    conversation: &Conversation,
    product: &Product,
    actor: &User,
    quantity: i32,
    total_price_override: Option<&BigDecimal>,
) -> Result<OfferTerms, ServiceError> {
    if !conversation.is_participant(actor.id) {
        return Err(ServiceError::Forbidden(
            "Only participants of this conversation can make offers".to_string(),
        ));
    }
    if !actor.is_farmer() {
        return Err(ServiceError::Forbidden(
            "Only farmers can create offers".to_string(),
        ));
    }
    if !product.is_active {
        return Err(ServiceError::Validation(format!(
            "{} is no longer available",
            product.name
        )));
    }
    if let Some(linked_product) = conversation.product_id {
        if linked_product != product.id {
            return Err(ServiceError::Validation(
                "Offers in this conversation must be for the product it was started about".to_string(),
            ));
        }
    }
    if !conversation.is_participant(product.farmer_id) {
        return Err(ServiceError::Validation(
            "The owner of this product is not part of the conversation".to_string(),
        ));
    }

    stock_reservation::remaining_after_reserve(product.stock_quantity, quantity)?;

    let farmer_id = product.farmer_id;
    let buyer_id = conversation
        .other_participant(farmer_id)
        .ok_or(ServiceError::NoCounterparty(conversation.id))?;

    let unit_price = to_money(&product.price);
    let total_price = match total_price_override {
        None => line_total(&unit_price, quantity),
        Some(_) if actor.id != farmer_id => {
            return Err(ServiceError::Forbidden(
                "Only the product owner can set a custom total price".to_string(),
            ));
        }
        Some(amount) if !is_positive(amount) => {
            return Err(ServiceError::Validation(
                "Total price must be greater than zero".to_string(),
            ));
        }
        Some(amount) => to_money(amount),
    };

    Ok(OfferTerms {
        farmer_id,
        buyer_id,
        quantity,
        unit_price,
        total_price,
    })
}

fn normalize_reason(reason: Option<String>) -> Result<Option<String>, ServiceError> {
    let reason = reason
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty());

    if let Some(r) = &reason {
        if r.chars().count() > MAX_CANCELLATION_REASON {
            return Err(ServiceError::Validation(format!(
                "Cancellation reason cannot exceed {} characters",
                MAX_CANCELLATION_REASON
            )));
        }
    }
    Ok(reason)
}

pub struct DealService {
    db_client: Arc<DBClient>,
    offer_window: chrono::Duration,
    lock_timeout: Duration,
}

impl DealService {
    pub fn new(db_client: Arc<DBClient>, offer_window: chrono::Duration, lock_timeout: Duration) -> Self {
        Self {
            db_client,
            offer_window,
            lock_timeout,
        }
    }

    pub async fn create_offer(
        &self,
        conversation_id: Uuid,
        actor: &User,
        dto: CreateOfferDto,
    ) -> Result<DealResponse, ServiceError> {
        let mut tx = self.db_client.begin_with_lock_timeout(self.lock_timeout).await?;

        // 1. Load the conversation and the product on offer
        let conversation = chatdb::get_conversation(&mut tx, conversation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Conversation".to_string()))?;

        let product = productdb::get_product(&mut tx, dto.product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product".to_string()))?;

        // 2. Settle parties and price
        let terms = offer_terms(&conversation, &product, actor, dto.quantity, dto.total_price.as_ref())?;

        // 3. Record the offer
        let deal = dealdb::insert_deal(&mut tx, NewDeal {
            conversation_id: conversation.id,
            product_id: product.id,
            farmer_id: terms.farmer_id,
            buyer_id: terms.buyer_id,
            created_by: actor.id,
            quantity: terms.quantity,
            unit_price: terms.unit_price,
            total_price: terms.total_price,
            expires_at: Utc::now() + self.offer_window,
        })
        .await?;

        // 4. Announce it in the conversation and bring the conversation back for both sides
        let announcement = format!(
            "Offer: {} {} of {} for {}",
            deal.quantity, product.unit, product.name, deal.total_price
        );
        chatdb::insert_message(&mut tx, conversation.id, actor.id, MessageType::OrderRequest, &announcement).await?;
        chatdb::restore_for_all(&mut tx, conversation.id).await?;

        tx.commit().await?;

        tracing::info!(
            "Deal {} offered by {} in conversation {}: {} x {} = {}",
            deal.id, actor.id, conversation.id, deal.quantity, product.name, deal.total_price
        );

        self.snapshot(&deal, actor.id).await
    }

    pub async fn accept(&self, deal_id: Uuid, actor: Uuid) -> Result<DealResponse, ServiceError> {
        let mut tx = self.db_client.begin_with_lock_timeout(self.lock_timeout).await?;

        let deal = self.lock_deal(&mut tx, deal_id).await?;
        deal.authorize_accept(actor, Utc::now())?;

        let remaining = stock_reservation::reserve(&mut tx, deal.product_id, deal.quantity).await?;

        // Both locks are held now; the offer may have lapsed while we waited for them.
        deal.authorize_accept(actor, Utc::now())?;

        let deal = dealdb::mark_confirmed(&mut tx, deal.id).await?;
        tx.commit().await?;

        tracing::info!(
            "Deal {} accepted by {}; product {} stock now {}",
            deal.id, actor, deal.product_id, remaining
        );

        self.snapshot(&deal, actor).await
    }

    pub async fn decline(&self, deal_id: Uuid, actor: Uuid) -> Result<DealResponse, ServiceError> {
        let mut tx = self.db_client.begin_with_lock_timeout(self.lock_timeout).await?;

        let deal = self.lock_deal(&mut tx, deal_id).await?;
        deal.authorize_decline(actor)?;

        let deal = dealdb::mark_declined(&mut tx, deal.id).await?;
        tx.commit().await?;

        tracing::info!("Deal {} declined by {}", deal.id, actor);

        self.snapshot(&deal, actor).await
    }

    pub async fn cancel(
        &self,
        deal_id: Uuid,
        actor: Uuid,
        reason: Option<String>,
    ) -> Result<DealResponse, ServiceError> {
        let reason = normalize_reason(reason)?;
        let mut tx = self.db_client.begin_with_lock_timeout(self.lock_timeout).await?;

        let deal = self.lock_deal(&mut tx, deal_id).await?;
        let effect = deal.authorize_cancel(actor)?;

        if effect == CancelEffect::ReleaseStock {
            stock_reservation::release(&mut tx, deal.product_id, deal.quantity).await?;
        }

        let deal = dealdb::mark_cancelled(&mut tx, deal.id, actor, reason).await?;
        tx.commit().await?;

        tracing::info!("Deal {} cancelled by {} ({:?})", deal.id, actor, effect);

        self.snapshot(&deal, actor).await
    }

    pub async fn complete(&self, deal_id: Uuid, actor: Uuid) -> Result<DealResponse, ServiceError> {
        let mut tx = self.db_client.begin_with_lock_timeout(self.lock_timeout).await?;

        let deal = self.lock_deal(&mut tx, deal_id).await?;
        deal.authorize_complete(actor)?;

        stock_reservation::record_sale(&mut tx, deal.product_id, deal.quantity).await?;

        let deal = dealdb::mark_completed(&mut tx, deal.id).await?;
        tx.commit().await?;

        tracing::info!("Deal {} completed by buyer {}", deal.id, actor);

        self.snapshot(&deal, actor).await
    }

    pub async fn submit_review(
        &self,
        deal_id: Uuid,
        actor: Uuid,
        dto: SubmitReviewDto,
    ) -> Result<ReviewResponse, ServiceError> {
        let mut tx = self.db_client.begin_with_lock_timeout(self.lock_timeout).await?;

        let deal = self.lock_deal(&mut tx, deal_id).await?;
        let already_reviewed = dealdb::review_exists(&mut tx, deal.id).await?;
        deal.authorize_review(actor, already_reviewed)?;

        let seller_rating = validate_rating(dto.seller_rating)?;
        let product_rating = validate_rating(dto.product_rating)?;

        let review = dealdb::insert_review(&mut tx, NewReview {
            deal_id: deal.id,
            reviewer_id: actor,
            seller_rating,
            seller_comment: dto.seller_comment.trim().to_string(),
            product_rating,
            product_comment: dto.product_comment.trim().to_string(),
        })
        .await
        .map_err(|e| {
            if ServiceError::is_unique_violation(&e) {
                ServiceError::AlreadyReviewed(deal.id)
            } else {
                ServiceError::from(e)
            }
        })?;

        let ratings = review_aggregator::refresh_ratings(&mut tx, deal.farmer_id, deal.product_id).await?;

        tx.commit().await?;

        tracing::info!("Deal {} reviewed by {}", deal.id, actor);

        Ok(ReviewResponse {
            review,
            farmer_rating: ratings.farmer,
            product_rating: ratings.product,
        })
    }

    pub async fn get_deal(&self, deal_id: Uuid, actor: Uuid) -> Result<DealResponse, ServiceError> {
        let deal = self.db_client
            .get_deal(deal_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Deal".to_string()))?;

        if !deal.is_party(actor) {
            return Err(ServiceError::Forbidden(
                "Only the parties to this deal can view it".to_string(),
            ));
        }

        self.snapshot(&deal, actor).await
    }

    /// Deals made in a conversation, newest first.
    pub async fn list_conversation_deals(
        &self,
        conversation_id: Uuid,
        actor: Uuid,
    ) -> Result<Vec<DealResponse>, ServiceError> {
        let mut conn = self.db_client.pool.acquire().await?;
        let conversation = chatdb::get_conversation(&mut conn, conversation_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Conversation".to_string()))?;
        drop(conn);

        if !conversation.is_participant(actor) {
            return Err(ServiceError::Forbidden(
                "Only participants of this conversation can view its deals".to_string(),
            ));
        }

        let deals = self.db_client.get_conversation_deals(conversation.id).await?;
        self.build_responses(&deals, actor).await
    }

    async fn lock_deal(&self, conn: &mut sqlx::PgConnection, deal_id: Uuid) -> Result<Deal, ServiceError> {
        dealdb::lock_deal(conn, deal_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Deal".to_string()))
    }

    async fn snapshot(&self, deal: &Deal, viewer: Uuid) -> Result<DealResponse, ServiceError> {
        self.build_responses(std::slice::from_ref(deal), viewer)
            .await?
            .pop()
            .ok_or_else(|| ServiceError::NotFound("Deal".to_string()))
    }

    async fn build_responses(&self, deals: &[Deal], viewer: Uuid) -> Result<Vec<DealResponse>, ServiceError> {
        if deals.is_empty() {
            return Ok(Vec::new());
        }

        let deal_ids: Vec<Uuid> = deals.iter().map(|d| d.id).collect();
        let reviewed = self.db_client.get_reviewed_deal_ids(&deal_ids).await?;

        let mut user_ids: Vec<Uuid> = deals
            .iter()
            .flat_map(|d| [d.farmer_id, d.buyer_id])
            .collect();
        user_ids.sort();
        user_ids.dedup();

        let users: HashMap<Uuid, _> = self.db_client
            .get_user_summaries(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        let mut products: HashMap<Uuid, ProductSummary> = HashMap::new();
        for deal in deals {
            if products.contains_key(&deal.product_id) {
                continue;
            }
            let product = self.db_client
                .get_product(deal.product_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound("Product".to_string()))?;
            products.insert(product.id, ProductSummary::from(&product));
        }

        let now = Utc::now();
        let responses = deals
            .iter()
            .filter_map(|deal| {
                let product = products.get(&deal.product_id)?.clone();
                Some(DealResponse::build(
                    deal,
                    viewer,
                    now,
                    reviewed.contains(&deal.id),
                    product,
                    &users,
                ))
            })
            .collect();

        Ok(responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{productmodel::tests::rice, usermodel::UserType};
    use std::str::FromStr;

    fn user(user_type: UserType) -> User {
        let id = Uuid::new_v4();
        User {
            id,
            username: format!("user-{}", &id.to_string()[..8]),
            name: "Test User".to_string(),
            email: format!("{}@example.com", id),
            user_type,
            is_verified: true,
            average_farmer_rating: BigDecimal::from(0),
            farmer_rating_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn conversation(one: Uuid, two: Uuid, product_id: Option<Uuid>) -> Conversation {
        Conversation {
            id: Uuid::new_v4(),
            participant_one_id: Some(one),
            participant_two_id: Some(two),
            product_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn kind<T: std::fmt::Debug>(result: Result<T, ServiceError>) -> &'static str {
        result.unwrap_err().kind()
    }

    #[test]
    fn test_owner_offer_is_priced_from_product() {
        let farmer = user(UserType::Farmer);
        let buyer = user(UserType::Buyer);
        let product = rice(farmer.id, 100);
        let conv = conversation(buyer.id, farmer.id, Some(product.id));

        let terms = offer_terms(&conv, &product, &farmer, 20, None).unwrap();
        assert_eq!(terms.farmer_id, farmer.id);
        assert_eq!(terms.buyer_id, buyer.id);
        assert_eq!(terms.unit_price.to_string(), "50.00");
        assert_eq!(terms.total_price.to_string(), "1000.00");
    }

    #[test]
    fn test_owner_may_override_total() {
        let farmer = user(UserType::Farmer);
        let buyer = user(UserType::Buyer);
        let product = rice(farmer.id, 100);
        let conv = conversation(farmer.id, buyer.id, None);

        let discount = BigDecimal::from_str("900").unwrap();
        let terms = offer_terms(&conv, &product, &farmer, 20, Some(&discount)).unwrap();
        assert_eq!(terms.total_price.to_string(), "900.00");

        let zero = BigDecimal::from(0);
        assert_eq!(kind(offer_terms(&conv, &product, &farmer, 20, Some(&zero))), "validation_error");
    }

    #[test]
    fn test_non_owner_farmer_offers_on_owners_product() {
        let owner = user(UserType::Farmer);
        let other = user(UserType::Both);
        let product = rice(owner.id, 100);
        let conv = conversation(owner.id, other.id, Some(product.id));

        let terms = offer_terms(&conv, &product, &other, 5, None).unwrap();
        assert_eq!(terms.farmer_id, owner.id);
        assert_eq!(terms.buyer_id, other.id);

        let custom = BigDecimal::from(10);
        assert_eq!(kind(offer_terms(&conv, &product, &other, 5, Some(&custom))), "forbidden");
    }

    #[test]
    fn test_offer_rejections() {
        let farmer = user(UserType::Farmer);
        let buyer = user(UserType::Buyer);
        let outsider = user(UserType::Farmer);
        let product = rice(farmer.id, 15);
        let conv = conversation(farmer.id, buyer.id, Some(product.id));

        assert_eq!(kind(offer_terms(&conv, &product, &outsider, 5, None)), "forbidden");
        assert_eq!(kind(offer_terms(&conv, &product, &buyer, 5, None)), "forbidden");
        assert_eq!(kind(offer_terms(&conv, &product, &farmer, 0, None)), "validation_error");

        match offer_terms(&conv, &product, &farmer, 20, None) {
            Err(ServiceError::InsufficientStock { available, .. }) => assert_eq!(available, 15),
            other => panic!("expected insufficient stock, got {:?}", other),
        }

        let other_product = rice(farmer.id, 100);
        assert_eq!(kind(offer_terms(&conv, &other_product, &farmer, 5, None)), "validation_error");

        let mut inactive = product.clone();
        inactive.is_active = false;
        assert_eq!(kind(offer_terms(&conv, &inactive, &farmer, 5, None)), "validation_error");
    }

    #[test]
    fn test_owner_outside_conversation() {
        let owner = user(UserType::Farmer);
        let a = user(UserType::Farmer);
        let b = user(UserType::Buyer);
        let product = rice(owner.id, 100);
        let conv = conversation(a.id, b.id, None);

        assert_eq!(kind(offer_terms(&conv, &product, &a, 5, None)), "validation_error");
    }

    #[test]
    fn test_vacated_seat_has_no_counterparty() {
        let farmer = user(UserType::Farmer);
        let product = rice(farmer.id, 100);
        let mut conv = conversation(farmer.id, Uuid::new_v4(), Some(product.id));
        conv.participant_two_id = None;

        assert_eq!(kind(offer_terms(&conv, &product, &farmer, 5, None)), "no_counterparty");
    }

    #[test]
    fn test_cancellation_reason() {
        assert_eq!(normalize_reason(None).unwrap(), None);
        assert_eq!(normalize_reason(Some("   ".to_string())).unwrap(), None);
        assert_eq!(
            normalize_reason(Some(" price changed ".to_string())).unwrap(),
            Some("price changed".to_string())
        );
        assert!(normalize_reason(Some("x".repeat(501))).is_err());
    }

    mod with_database {
        use super::*;
        use sqlx::PgPool;

        struct Fixture {
            service: DealService,
            pool: PgPool,
            farmer: User,
            buyer: User,
            conversation_id: Uuid,
            product_id: Uuid,
        }

        async fn insert_user(pool: &PgPool, username: &str, user_type: UserType) -> User {
            sqlx::query_as::<_, User>(
                r#"
                INSERT INTO users (username, name, email, user_type, is_verified)
                VALUES ($1, $1, $1 || '@example.com', $2, true)
                RETURNING id, username, name, email, user_type, is_verified,
                          average_farmer_rating, farmer_rating_count, created_at, updated_at
                "#,
            )
            .bind(username)
            .bind(user_type)
            .fetch_one(pool)
            .await
            .unwrap()
        }

        async fn fixture(pool: PgPool, stock: i32) -> Fixture {
            let farmer = insert_user(&pool, "farmer", UserType::Farmer).await;
            let buyer = insert_user(&pool, "buyer", UserType::Buyer).await;

            let product_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO products (farmer_id, name, price, unit, stock_quantity)
                VALUES ($1, 'Rice', 50.00, 'kg', $2)
                RETURNING id
                "#,
            )
            .bind(farmer.id)
            .bind(stock)
            .fetch_one(&pool)
            .await
            .unwrap();

            let conversation_id = sqlx::query_scalar::<_, Uuid>(
                r#"
                INSERT INTO conversations (participant_one_id, participant_two_id, product_id)
                VALUES ($1, $2, $3)
                RETURNING id
                "#,
            )
            .bind(buyer.id)
            .bind(farmer.id)
            .bind(product_id)
            .fetch_one(&pool)
            .await
            .unwrap();

            let db_client = Arc::new(DBClient::new(pool.clone()));
            let service = DealService::new(db_client, chrono::Duration::minutes(15), Duration::from_secs(5));

            Fixture { service, pool, farmer, buyer, conversation_id, product_id }
        }

        async fn stock_and_sales(pool: &PgPool, product_id: Uuid) -> (i32, i32) {
            sqlx::query_as::<_, (i32, i32)>("SELECT stock_quantity, total_sales FROM products WHERE id = $1")
                .bind(product_id)
                .fetch_one(pool)
                .await
                .unwrap()
        }

        fn offer(product_id: Uuid, quantity: i32) -> CreateOfferDto {
            CreateOfferDto { product_id, quantity, total_price: None }
        }

        #[sqlx::test]
        #[ignore = "needs DATABASE_URL"]
        async fn test_worked_example(pool: PgPool) {
            let f = fixture(pool, 100).await;

            let deal = f.service.create_offer(f.conversation_id, &f.farmer, offer(f.product_id, 20)).await.unwrap();
            assert_eq!(deal.total_price.to_string(), "1000.00");
            assert_eq!(deal.status, DealStatus::Pending);
            assert!(deal.time_until_expiry > 14 * 60);

            let accepted = f.service.accept(deal.id, f.buyer.id).await.unwrap();
            assert_eq!(accepted.status, DealStatus::Confirmed);
            assert_eq!(stock_and_sales(&f.pool, f.product_id).await, (80, 0));

            f.service.complete(deal.id, f.buyer.id).await.unwrap();
            assert_eq!(stock_and_sales(&f.pool, f.product_id).await, (80, 20));

            let review = f.service
                .submit_review(deal.id, f.buyer.id, SubmitReviewDto {
                    seller_rating: 5,
                    seller_comment: "Great".to_string(),
                    product_rating: 4,
                    product_comment: "Good rice".to_string(),
                })
                .await
                .unwrap();
            assert_eq!(review.farmer_rating.average.to_string(), "5.00");
            assert_eq!(review.farmer_rating.count, 1);
            assert_eq!(review.product_rating.average.to_string(), "4.00");

            let again = f.service
                .submit_review(deal.id, f.buyer.id, SubmitReviewDto {
                    seller_rating: 1,
                    seller_comment: String::new(),
                    product_rating: 1,
                    product_comment: String::new(),
                })
                .await;
            assert_eq!(kind(again), "already_reviewed");

            let messages: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND message_type = 'order_request'",
            )
            .bind(f.conversation_id)
            .fetch_one(&f.pool)
            .await
            .unwrap();
            assert_eq!(messages, 1);
        }

        #[sqlx::test]
        #[ignore = "needs DATABASE_URL"]
        async fn test_repeated_transitions_do_not_double_apply(pool: PgPool) {
            let f = fixture(pool, 100).await;
            let deal = f.service.create_offer(f.conversation_id, &f.farmer, offer(f.product_id, 30)).await.unwrap();

            f.service.accept(deal.id, f.buyer.id).await.unwrap();
            assert_eq!(kind(f.service.accept(deal.id, f.buyer.id).await), "invalid_state");
            assert_eq!(stock_and_sales(&f.pool, f.product_id).await, (70, 0));

            f.service.cancel(deal.id, f.farmer.id, Some("Truck broke down".to_string())).await.unwrap();
            assert_eq!(stock_and_sales(&f.pool, f.product_id).await, (100, 0));
            assert_eq!(kind(f.service.cancel(deal.id, f.farmer.id, None).await), "invalid_state");
            assert_eq!(stock_and_sales(&f.pool, f.product_id).await, (100, 0));
        }

        #[sqlx::test]
        #[ignore = "needs DATABASE_URL"]
        async fn test_deals_survive_product_and_user_deletes(pool: PgPool) {
            let f = fixture(pool, 100).await;
            let deal = f.service.create_offer(f.conversation_id, &f.farmer, offer(f.product_id, 5)).await.unwrap();

            let product_delete = sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(f.product_id)
                .execute(&f.pool)
                .await;
            assert!(product_delete.is_err());

            let buyer_delete = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(f.buyer.id)
                .execute(&f.pool)
                .await;
            assert!(buyer_delete.is_err());

            let still_there = f.service.get_deal(deal.id, f.buyer.id).await.unwrap();
            assert_eq!(still_there.status, DealStatus::Pending);
        }

        #[sqlx::test]
        #[ignore = "needs DATABASE_URL"]
        async fn test_expired_offer_leaves_stock(pool: PgPool) {
            let f = fixture(pool, 100).await;
            let deal = f.service.create_offer(f.conversation_id, &f.farmer, offer(f.product_id, 20)).await.unwrap();

            sqlx::query("UPDATE deals SET expires_at = NOW() - INTERVAL '1 minute' WHERE id = $1")
                .bind(deal.id)
                .execute(&f.pool)
                .await
                .unwrap();

            assert_eq!(kind(f.service.accept(deal.id, f.buyer.id).await), "invalid_state");
            assert_eq!(stock_and_sales(&f.pool, f.product_id).await, (100, 0));
        }

        #[sqlx::test]
        #[ignore = "needs DATABASE_URL"]
        async fn test_concurrent_accepts_never_oversell(pool: PgPool) {
            let f = fixture(pool, 100).await;
            let first = f.service.create_offer(f.conversation_id, &f.farmer, offer(f.product_id, 60)).await.unwrap();
            let second = f.service.create_offer(f.conversation_id, &f.farmer, offer(f.product_id, 60)).await.unwrap();

            let (a, b) = tokio::join!(
                f.service.accept(first.id, f.buyer.id),
                f.service.accept(second.id, f.buyer.id),
            );

            let (ok, failed) = match (a, b) {
                (Ok(ok), Err(e)) | (Err(e), Ok(ok)) => (ok, e),
                other => panic!("expected exactly one accept to succeed, got {:?}", other),
            };
            assert_eq!(ok.status, DealStatus::Confirmed);
            match failed {
                ServiceError::InsufficientStock { requested, available } => {
                    assert_eq!(requested, 60);
                    assert_eq!(available, 40);
                }
                other => panic!("expected insufficient stock, got {:?}", other),
            }
            assert_eq!(stock_and_sales(&f.pool, f.product_id).await, (40, 0));
        }
    }
}
