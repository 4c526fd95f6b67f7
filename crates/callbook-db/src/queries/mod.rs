mod accounts;
mod bookings;
mod notifications;
mod payments;
mod performers;
mod sessions;
mod slots;

#[cfg(test)]
pub(crate) mod fixtures;
