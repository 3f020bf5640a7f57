use std::time::Duration;

/// Control queries answered by the session, mirroring what a host player
/// asks of a demux module.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlQuery {
    CanSeek,
    CanPause,
    CanControlPace,
    /// Playback position as a fraction of the total length.
    GetPosition,
    /// Seek to a fraction of the total length.
    SetPosition(f64),
    GetTime,
    SetTime(Duration),
    GetLength,
    GetPtsDelay,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlResponse {
    Flag(bool),
    Position(f64),
    Time(Duration),
    Length(Duration),
    PtsDelay(Duration),
    /// The query mutated state and carries no value.
    Done,
}
