use std::{pin::Pin, sync::Arc};

use crate::events::{
    EventHandler,
    EventProducer,
    Handler,
    OrderAnnulledEvent,
    OrderCompletedEvent,
    OrderPaidEvent,
    RefundFailedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub order_annulled_producer: Vec<EventProducer<OrderAnnulledEvent>>,
    pub order_completed_producer: Vec<EventProducer<OrderCompletedEvent>>,
    pub refund_failed_producer: Vec<EventProducer<RefundFailedEvent>>,
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_order_annulled: Option<EventHandler<OrderAnnulledEvent>>,
    pub on_order_completed: Option<EventHandler<OrderCompletedEvent>>,
    pub on_refund_failed: Option<EventHandler<RefundFailedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_order_annulled = hooks.on_order_annulled.map(|f| EventHandler::new(buffer_size, f));
        let on_order_completed = hooks.on_order_completed.map(|f| EventHandler::new(buffer_size, f));
        let on_refund_failed = hooks.on_refund_failed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_paid, on_order_annulled, on_order_completed, on_refund_failed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_annulled {
            result.order_annulled_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_order_completed {
            result.order_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_refund_failed {
            result.refund_failed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_annulled {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_order_completed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_refund_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_order_annulled: Option<Handler<OrderAnnulledEvent>>,
    pub on_order_completed: Option<Handler<OrderCompletedEvent>>,
    pub on_refund_failed: Option<Handler<RefundFailedEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_order_annulled<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderAnnulledEvent) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_order_annulled = Some(Arc::new(f));
        self
    }

    pub fn on_order_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderCompletedEvent) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_order_completed = Some(Arc::new(f));
        self
    }

    pub fn on_refund_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(RefundFailedEvent) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_refund_failed = Some(Arc::new(f));
        self
    }
}
