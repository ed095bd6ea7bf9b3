//! 队列状态转换脚本，每个转换在 Redis 端原子执行

/// KEYS: waiting, delayed
/// ARGV: job key, data, priority, available_at_ms, delayed(0/1), enqueued_at_ms, id
pub const ADD: &str = r#"
redis.call('HSET', ARGV[1], 'data', ARGV[2], 'priority', ARGV[3], 'attempts_made', '0',
    'enqueued_at', ARGV[6])
if ARGV[5] == '1' then
    redis.call('HSET', ARGV[1], 'state', 'delayed')
    redis.call('ZADD', KEYS[2], ARGV[4], ARGV[7])
else
    redis.call('HSET', ARGV[1], 'state', 'waiting')
    redis.call('ZADD', KEYS[1], string.format('%.0f', tonumber(ARGV[3]) * 1e13 + tonumber(ARGV[4])), ARGV[7])
end
return 1
"#;

/// KEYS: waiting, delayed, active
/// ARGV: key base, now_ms, lock_ms, lock token
///
/// 先把到期的延迟请求和锁过期的请求移回 waiting，再领取分值最小的请求。
pub const CLAIM: &str = r#"
local base = ARGV[1]
local now = tonumber(ARGV[2])

local function requeue(set, id, available)
    local jk = base .. 'job:' .. id
    local priority = tonumber(redis.call('HGET', jk, 'priority') or '0')
    redis.call('ZREM', set, id)
    redis.call('ZADD', KEYS[1], string.format('%.0f', priority * 1e13 + available), id)
    redis.call('HSET', jk, 'state', 'waiting')
    redis.call('HDEL', jk, 'lock_token')
end

local due = redis.call('ZRANGEBYSCORE', KEYS[2], '-inf', now, 'WITHSCORES')
for i = 1, #due, 2 do
    requeue(KEYS[2], due[i], tonumber(due[i + 1]))
end

local stalled = redis.call('ZRANGEBYSCORE', KEYS[3], '-inf', now)
for _, id in ipairs(stalled) do
    requeue(KEYS[3], id, now)
end

local head = redis.call('ZRANGE', KEYS[1], 0, 0)
if #head == 0 then
    return false
end

local id = head[1]
local jk = base .. 'job:' .. id
redis.call('ZREM', KEYS[1], id)
redis.call('ZADD', KEYS[3], string.format('%.0f', now + tonumber(ARGV[3])), id)
redis.call('HSET', jk, 'state', 'active', 'lock_token', ARGV[4], 'processed_at', ARGV[2])

local fields = redis.call('HMGET', jk, 'data', 'attempts_made', 'failed_reason')
return {id, fields[1] or '', fields[2] or '0', fields[3] or ''}
"#;

/// KEYS: active, completed
/// ARGV: key base, id, lock token, now_ms, keep
pub const ACK: &str = r#"
local jk = ARGV[1] .. 'job:' .. ARGV[2]
if redis.call('HGET', jk, 'lock_token') ~= ARGV[3] then
    return 0
end
if not redis.call('ZSCORE', KEYS[1], ARGV[2]) then
    return 0
end

redis.call('ZREM', KEYS[1], ARGV[2])
redis.call('HSET', jk, 'state', 'completed', 'finished_at', ARGV[4])
redis.call('HDEL', jk, 'lock_token')
redis.call('LPUSH', KEYS[2], ARGV[2])

local keep = tonumber(ARGV[5])
local expired = redis.call('LRANGE', KEYS[2], keep, -1)
for _, old in ipairs(expired) do
    redis.call('DEL', ARGV[1] .. 'job:' .. old)
end
if keep == 0 then
    redis.call('DEL', KEYS[2])
else
    redis.call('LTRIM', KEYS[2], 0, keep - 1)
end
return 1
"#;

/// KEYS: active, delayed, failed
/// ARGV: key base, id, lock token, now_ms, attempts_made, dead(0/1), delay_ms, reason, keep
///
/// 尝试次数只增不减；进入 failed 的请求不再回到待处理集合。
pub const NACK: &str = r#"
local jk = ARGV[1] .. 'job:' .. ARGV[2]
if redis.call('HGET', jk, 'lock_token') ~= ARGV[3] then
    return 0
end
if not redis.call('ZSCORE', KEYS[1], ARGV[2]) then
    return 0
end

local now = tonumber(ARGV[4])
local current = tonumber(redis.call('HGET', jk, 'attempts_made') or '0')
local attempts = math.max(current, tonumber(ARGV[5]))

redis.call('ZREM', KEYS[1], ARGV[2])
redis.call('HDEL', jk, 'lock_token')
redis.call('HSET', jk, 'attempts_made', tostring(attempts), 'failed_reason', ARGV[8])

if ARGV[6] == '1' then
    redis.call('HSET', jk, 'state', 'failed', 'finished_at', ARGV[4])
    redis.call('LPUSH', KEYS[3], ARGV[2])
    local keep = tonumber(ARGV[9])
    local expired = redis.call('LRANGE', KEYS[3], keep, -1)
    for _, old in ipairs(expired) do
        redis.call('DEL', ARGV[1] .. 'job:' .. old)
    end
    if keep == 0 then
        redis.call('DEL', KEYS[3])
    else
        redis.call('LTRIM', KEYS[3], 0, keep - 1)
    end
else
    redis.call('HSET', jk, 'state', 'delayed')
    redis.call('ZADD', KEYS[2], string.format('%.0f', now + tonumber(ARGV[7])), ARGV[2])
end
return 1
"#;
