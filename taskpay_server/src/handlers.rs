//! Maps decoded [`ClientCommand`]s onto engine calls and renders the reply the front-end shows the user.
//!
//! Precondition failures (applying twice, approving someone who never applied, and so on) are expected user
//! behaviour; they come back through [`EscrowError`]'s `Display` text, which is written to be shown verbatim.
use taskpay_engine::{
    db_types::{Order, UserId},
    traits::{AccountManagement, EmailGateway, EscrowDatabase, EscrowError},
    OrderLifecycleApi,
};

use crate::commands::ClientCommand;

pub async fn handle_command<B, G>(
    api: &OrderLifecycleApi<B, G>,
    user: UserId,
    command: ClientCommand,
) -> Result<String, EscrowError>
where
    B: EscrowDatabase,
    G: EmailGateway,
{
    let reply = match command {
        ClientCommand::SetRole(role) => {
            api.register_role(user, role).await?;
            format!("You are now registered as a {role}.")
        },
        ClientCommand::SetContactEmail(email) => {
            api.register_email(user, &email).await?;
            format!("Confirmation codes for your orders will be sent to {email}.")
        },
        ClientCommand::ShowBalance => {
            let account = api.db().fetch_or_create_account(user).await?;
            format!("Your balance is {}.", account.balance)
        },
        ClientCommand::TopUp(amount) => {
            let account = api.top_up(user, amount).await?;
            format!("Credited {amount}. Your balance is now {}.", account.balance)
        },
        ClientCommand::CreateOrder(draft) => {
            let order = api.create_order(draft.into_new_order(user)).await?;
            format!("Order #{} created. {} is held in escrow until delivery is confirmed.", order.id, order.amount)
        },
        ClientCommand::ListRequesterOrders => {
            let orders = api.orders_for_requester(user).await?;
            render_order_list("Your orders", &orders)
        },
        ClientCommand::ListOpenOrders => {
            let orders = api.open_orders_for(user).await?;
            render_order_list("Open orders", &orders)
        },
        ClientCommand::ListActiveOrders => {
            let orders = api.active_orders_for_worker(user).await?;
            render_order_list("Your active work", &orders)
        },
        ClientCommand::ListResponses { order_id } => {
            let responses = api.responses_for_order(order_id).await?;
            if responses.is_empty() {
                format!("No one has applied to order #{order_id} yet.")
            } else {
                let workers =
                    responses.iter().map(|r| r.worker.to_string()).collect::<Vec<_>>().join(", ");
                format!("Applicants for order #{order_id}: {workers}")
            }
        },
        ClientCommand::Respond { order_id } => {
            api.apply_to_order(order_id, user).await?;
            format!("You have applied to order #{order_id}. The requester will pick an applicant.")
        },
        ClientCommand::Approve { order_id, worker } => {
            api.assign_worker(order_id, user, worker).await?;
            format!("Worker {worker} is now assigned to order #{order_id}.")
        },
        ClientCommand::Deliver { order_id } => {
            let outcome = api.mark_delivered(order_id, user).await?;
            match outcome.dispatch_error {
                None => format!(
                    "Order #{order_id} marked as delivered. A confirmation code has been mailed to your address; \
                     ask the requester to forward it back to confirm the payout."
                ),
                Some(e) => format!(
                    "Order #{order_id} marked as delivered, but the confirmation mail could not be sent ({e}). \
                     Contact support before the confirmation window lapses."
                ),
            }
        },
        ClientCommand::CheckEmail => match api.check_confirmations(user).await? {
            Some(order) => format!("Order #{} is confirmed. {} has been paid out to you.", order.id, order.amount),
            None => "No valid confirmation mails found.".to_string(),
        },
    };
    Ok(reply)
}

fn render_order_list(heading: &str, orders: &[Order]) -> String {
    if orders.is_empty() {
        return format!("{heading}: none.");
    }
    let lines = orders
        .iter()
        .map(|o| format!("#{} [{}] {} for {}", o.id, o.status, o.title, o.amount))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{heading}:\n{lines}")
}
