/// Lua script for sliding window rate limiting
///
/// Approximates a sliding window by blending two fixed sub-windows: the
/// previous window's count is weighted by how much of it still overlaps the
/// moving window. Denied requests are not counted.
///
/// The estimate lags a true sliding window. A client that spent its whole
/// capacity at the start of one sub-window is still denied exactly one window
/// later, and the first request after that sees `remaining = 0` rather than
/// `capacity - 1` until the previous sub-window has fully decayed.
///
/// KEYS[1] = the rate limit key (sub-window start is appended)
/// ARGV[1] = capacity
/// ARGV[2] = window duration (milliseconds)
/// ARGV[3] = current timestamp (milliseconds)
///
/// Returns: [request position in window, reset timestamp (milliseconds)]
pub const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local now = tonumber(ARGV[3])

local current_start = now - (now % window)
local current_key = key .. ':' .. current_start
local previous_key = key .. ':' .. (current_start - window)

local current = tonumber(redis.call('GET', current_key) or '0')
local previous = tonumber(redis.call('GET', previous_key) or '0')

-- Weight of the previous window still inside the sliding window
local elapsed = now - current_start
local weight = (window - elapsed) / window
local estimated = math.floor(previous * weight) + current

if estimated >= capacity then
    local reset_at = current_start + window
    if current < capacity and previous > 0 then
        -- Point at which the decaying previous window lets one more request in
        local needed = window * (1 - (capacity - current) / previous)
        reset_at = current_start + math.floor(needed) + 1
    end
    return {estimated + 1, reset_at}
end

redis.call('INCR', current_key)
redis.call('PEXPIRE', current_key, window * 2)

return {estimated + 1, current_start + window}
"#;
