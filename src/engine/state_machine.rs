use chrono::{DateTime, Utc};

use crate::error::DispatchError;
use crate::models::actor::Actor;
use crate::models::order::{CancelReason, Order, OrderStatus};

/// Result of applying one edge to an order snapshot. Nothing is committed
/// until the caller saves `order` against the version it was read at.
#[derive(Debug, Clone)]
pub struct Transition {
    pub order: Order,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub changed: bool,
}

pub fn is_legal(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    matches!(
        (from, to),
        (Created, Assigned)
            | (Assigned, CourierEnRoutePickup)
            | (CourierEnRoutePickup, PickedUp)
            | (PickedUp, EnRouteDropoff)
            | (EnRouteDropoff, Delivered)
            | (Delivered, Completed)
            | (Created, Canceled)
            | (Assigned, Canceled)
            | (Delivered, Disputed)
            | (Completed, Disputed)
    )
}

/// Moves `order` to `target` on behalf of `actor`.
///
/// Asking for the current status is a successful no-op that leaves
/// `updated_at` untouched, so retried requests are harmless.
pub fn transition(
    order: &Order,
    target: OrderStatus,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Result<Transition, DispatchError> {
    let reason = match actor {
        Actor::Customer(_) => CancelReason::CustomerRequested,
        Actor::Courier(_) => CancelReason::CourierWithdrew,
        Actor::Admin | Actor::System => CancelReason::SystemCanceled,
    };
    apply(order, target, actor, reason, now)
}

/// Cancellation with an explicit reason, e.g. `NoCouriersAvailable`.
pub fn cancel(
    order: &Order,
    actor: &Actor,
    reason: CancelReason,
    now: DateTime<Utc>,
) -> Result<Transition, DispatchError> {
    apply(order, OrderStatus::Canceled, actor, reason, now)
}

fn apply(
    order: &Order,
    target: OrderStatus,
    actor: &Actor,
    reason: CancelReason,
    now: DateTime<Utc>,
) -> Result<Transition, DispatchError> {
    let from = order.status;

    if from == target {
        return Ok(Transition {
            order: order.clone(),
            from,
            to: target,
            changed: false,
        });
    }

    if !is_legal(from, target) {
        return Err(DispatchError::IllegalTransition { from, to: target });
    }

    authorize(order, target, actor)?;

    let mut next = order.clone();
    next.status = target;
    next.updated_at = now;

    match target {
        OrderStatus::Assigned => {
            if let Actor::Courier(courier_id) = actor {
                next.courier_id = Some(*courier_id);
            }
        }
        OrderStatus::PickedUp => next.pickup_time = Some(now),
        OrderStatus::Delivered => next.dropoff_time = Some(now),
        OrderStatus::Completed => next.completed_at = Some(now),
        OrderStatus::Disputed => next.disputed_at = Some(now),
        OrderStatus::Canceled => {
            next.courier_id = None;
            next.canceled_at = Some(now);
            next.cancel_reason = Some(reason);
        }
        OrderStatus::Created
        | OrderStatus::CourierEnRoutePickup
        | OrderStatus::EnRouteDropoff => {}
    }

    Ok(Transition {
        order: next,
        from,
        to: target,
        changed: true,
    })
}

fn authorize(order: &Order, target: OrderStatus, actor: &Actor) -> Result<(), DispatchError> {
    use OrderStatus::*;

    let is_owner = matches!(actor, Actor::Customer(id) if *id == order.customer_id);
    let is_matched_courier =
        matches!(actor, Actor::Courier(id) if Some(*id) == order.courier_id);
    let is_system = matches!(actor, Actor::System);
    let is_admin = matches!(actor, Actor::Admin);

    let allowed = match (order.status, target) {
        // The accepting courier claims the order; the matcher vets the offer first.
        (Created, Assigned) => matches!(actor, Actor::Courier(_)),
        (Created, Canceled) => is_owner || is_system,
        (Assigned, Canceled) => is_matched_courier || is_system,
        (Assigned, CourierEnRoutePickup)
        | (CourierEnRoutePickup, PickedUp)
        | (PickedUp, EnRouteDropoff)
        | (EnRouteDropoff, Delivered) => is_matched_courier || is_system,
        (Delivered, Completed) | (Delivered, Disputed) | (Completed, Disputed) => {
            is_owner || is_admin || is_system
        }
        _ => false,
    };

    if allowed {
        Ok(())
    } else {
        Err(DispatchError::Unauthorized {
            actor: actor.to_string(),
            from: order.status,
            to: target,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    use super::{cancel, is_legal, transition};
    use crate::error::DispatchError;
    use crate::models::actor::Actor;
    use crate::models::order::{CancelReason, Order, OrderStatus};
    use crate::test_support::sample_order;

    fn order_in(status: OrderStatus) -> Order {
        let mut order = sample_order();
        order.status = status;
        if status.has_courier() {
            order.courier_id = Some(Uuid::from_u128(42));
        }
        order
    }

    fn privileged_actor(order: &Order, from: OrderStatus, to: OrderStatus) -> Actor {
        match (from, to) {
            (OrderStatus::Created, OrderStatus::Assigned) => Actor::Courier(Uuid::from_u128(42)),
            (OrderStatus::Delivered, _) | (OrderStatus::Completed, _) => {
                Actor::Customer(order.customer_id)
            }
            _ => Actor::System,
        }
    }

    #[test]
    fn transition_succeeds_only_on_legal_edges() {
        let now = Utc::now();
        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                if from == to {
                    continue;
                }
                let order = order_in(from);
                let actor = privileged_actor(&order, from, to);
                let result = transition(&order, to, &actor, now);

                if is_legal(from, to) {
                    let applied = result.unwrap_or_else(|err| panic!("{from} -> {to}: {err}"));
                    assert_eq!(applied.order.status, to);
                    assert!(applied.changed);
                } else {
                    assert_eq!(
                        result.unwrap_err(),
                        DispatchError::IllegalTransition { from, to },
                        "{from} -> {to}"
                    );
                }
            }
        }
    }

    #[test]
    fn same_status_is_a_no_op() {
        let later = Utc::now() + Duration::minutes(5);
        for status in OrderStatus::ALL {
            let order = order_in(status);
            let applied = transition(&order, status, &Actor::System, later).unwrap();
            assert!(!applied.changed);
            assert_eq!(applied.order, order);
            assert_eq!(applied.order.updated_at, order.updated_at);
        }
    }

    #[test]
    fn full_happy_path_sets_timestamps() {
        let courier = Uuid::from_u128(9);
        let mut order = order_in(OrderStatus::Created);
        let now = Utc::now();

        order = transition(&order, OrderStatus::Assigned, &Actor::Courier(courier), now)
            .unwrap()
            .order;
        assert_eq!(order.courier_id, Some(courier));

        for target in [
            OrderStatus::CourierEnRoutePickup,
            OrderStatus::PickedUp,
            OrderStatus::EnRouteDropoff,
            OrderStatus::Delivered,
        ] {
            order = transition(&order, target, &Actor::Courier(courier), now)
                .unwrap()
                .order;
        }
        assert_eq!(order.pickup_time, Some(now));
        assert_eq!(order.dropoff_time, Some(now));

        let customer = Actor::Customer(order.customer_id);
        order = transition(&order, OrderStatus::Completed, &customer, now)
            .unwrap()
            .order;
        assert_eq!(order.completed_at, Some(now));
        assert_eq!(order.updated_at, now);
        assert_eq!(order.courier_id, Some(courier));
    }

    #[test]
    fn only_matched_courier_or_system_progresses_delivery() {
        let order = order_in(OrderStatus::Assigned);
        let now = Utc::now();

        for actor in [
            Actor::Customer(order.customer_id),
            Actor::Courier(Uuid::from_u128(7)),
            Actor::Admin,
        ] {
            assert!(matches!(
                transition(&order, OrderStatus::CourierEnRoutePickup, &actor, now),
                Err(DispatchError::Unauthorized { .. })
            ));
        }

        assert!(transition(&order, OrderStatus::CourierEnRoutePickup, &Actor::System, now).is_ok());
        assert!(
            transition(
                &order,
                OrderStatus::CourierEnRoutePickup,
                &Actor::Courier(Uuid::from_u128(42)),
                now
            )
            .is_ok()
        );
    }

    #[test]
    fn created_orders_cancel_only_by_owner_or_system() {
        let order = order_in(OrderStatus::Created);
        let now = Utc::now();

        let by_owner = transition(
            &order,
            OrderStatus::Canceled,
            &Actor::Customer(order.customer_id),
            now,
        )
        .unwrap();
        assert_eq!(by_owner.order.cancel_reason, Some(CancelReason::CustomerRequested));
        assert_eq!(by_owner.order.canceled_at, Some(now));

        assert!(matches!(
            transition(&order, OrderStatus::Canceled, &Actor::Customer(Uuid::new_v4()), now),
            Err(DispatchError::Unauthorized { .. })
        ));
        assert!(matches!(
            transition(&order, OrderStatus::Canceled, &Actor::Courier(Uuid::new_v4()), now),
            Err(DispatchError::Unauthorized { .. })
        ));
    }

    #[test]
    fn assignment_requires_a_courier_actor() {
        let order = order_in(OrderStatus::Created);
        assert!(matches!(
            transition(&order, OrderStatus::Assigned, &Actor::System, Utc::now()),
            Err(DispatchError::Unauthorized { .. })
        ));
    }

    #[test]
    fn canceling_an_assigned_order_clears_the_courier() {
        let order = order_in(OrderStatus::Assigned);
        let applied = transition(
            &order,
            OrderStatus::Canceled,
            &Actor::Courier(Uuid::from_u128(42)),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(applied.order.courier_id, None);
        assert_eq!(applied.order.cancel_reason, Some(CancelReason::CourierWithdrew));
    }

    #[test]
    fn explicit_cancel_reason_is_recorded() {
        let order = order_in(OrderStatus::Created);
        let applied = cancel(
            &order,
            &Actor::System,
            CancelReason::NoCouriersAvailable,
            Utc::now(),
        )
        .unwrap();
        assert_eq!(applied.order.cancel_reason, Some(CancelReason::NoCouriersAvailable));
    }

    #[test]
    fn disputes_follow_delivery_and_are_final() {
        let delivered = order_in(OrderStatus::Delivered);
        let disputed = transition(
            &delivered,
            OrderStatus::Disputed,
            &Actor::Customer(delivered.customer_id),
            Utc::now(),
        )
        .unwrap()
        .order;
        assert!(disputed.disputed_at.is_some());

        for target in OrderStatus::ALL {
            if target != OrderStatus::Disputed {
                assert!(transition(&disputed, target, &Actor::Admin, Utc::now()).is_err());
            }
        }
    }
}
