use chrono::{DateTime, Duration, Utc};

use crate::models::{
    ActivityEvent, ContentView, MilestoneUnlock, SessionBooking, WorkoutCompletion,
};

/// All five signals are normalized over the same lookback window.
pub const LOOKBACK_DAYS: i64 = 30;

/// Event count at which the activity sub-score saturates.
const ACTIVITY_TARGET_EVENTS: f64 = 50.0;
/// Booking count at which the booking half of the session sub-score saturates.
const SESSION_TARGET_BOOKINGS: f64 = 10.0;
/// Completion count at which the workout sub-score saturates.
const WORKOUT_TARGET_COMPLETIONS: f64 = 20.0;
/// Completed-view count at which the completion half of the content sub-score saturates.
const CONTENT_TARGET_COMPLETIONS: f64 = 10.0;
/// One hour of watch time saturates the watch-time half of the content sub-score.
const CONTENT_TARGET_WATCH_SECONDS: f64 = 3600.0;
/// Unlock count at which the milestone sub-score saturates.
const MILESTONE_TARGET_UNLOCKS: f64 = 5.0;

pub fn lookback_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(LOOKBACK_DAYS)
}

pub fn activity_subscore(events: &[ActivityEvent]) -> f64 {
    (events.len() as f64 / ACTIVITY_TARGET_EVENTS).min(1.0) * 100.0
}

/// Session sub-score: half from booking volume, half from attendance rate.
///
/// Only bookings whose linked session resolved and is scheduled inside the
/// window count. A booking whose session was deleted is excluded from both
/// the booked and attended tallies, not treated as a no-show.
pub fn session_subscore(bookings: &[SessionBooking], window_start: DateTime<Utc>) -> f64 {
    let eligible: Vec<&SessionBooking> = bookings
        .iter()
        .filter(|b| {
            b.session_scheduled_at
                .is_some_and(|scheduled_at| scheduled_at >= window_start)
        })
        .collect();

    if eligible.is_empty() {
        return 0.0;
    }

    let booked = eligible.len() as f64;
    let attended = eligible.iter().filter(|b| b.attended).count() as f64;

    let booking_score = (booked / SESSION_TARGET_BOOKINGS).min(1.0) * 50.0;
    let attendance_rate = attended / booked * 100.0;
    let attendance_component = attendance_rate * 0.5;

    (booking_score + attendance_component).min(100.0)
}

pub fn workout_subscore(completions: &[WorkoutCompletion]) -> f64 {
    (completions.len() as f64 / WORKOUT_TARGET_COMPLETIONS).min(1.0) * 100.0
}

/// Content sub-score: half from completed views, half from total watch time.
pub fn content_subscore(views: &[ContentView]) -> f64 {
    if views.is_empty() {
        return 0.0;
    }

    let completed = views.iter().filter(|v| v.completed).count() as f64;
    let watched_seconds: i64 = views.iter().map(|v| v.watched_seconds).sum();

    let completion_component = (completed / CONTENT_TARGET_COMPLETIONS).min(1.0) * 50.0;
    let watch_time_component =
        (watched_seconds as f64 / CONTENT_TARGET_WATCH_SECONDS).min(1.0) * 50.0;

    completion_component + watch_time_component
}

pub fn milestone_subscore(unlocks: &[MilestoneUnlock]) -> f64 {
    (unlocks.len() as f64 / MILESTONE_TARGET_UNLOCKS).min(1.0) * 100.0
}
