//! Server-side scripts run inside a transaction.

/// Drops a row's entries from every value index it appears in.
///
/// `KEYS[1]` is the row hash, `ARGV[1]` the table key base, `ARGV[2]` the
/// rowid and `ARGV[3..]` the indexed column names. Reading the current
/// value and removing the membership happen in one atomic step, and a value
/// is pruned from its sorted index once no row holds it. Returns the number
/// of memberships removed.
pub const DROP_INDEX_ENTRIES: &str = r"local removed = 0
for i = 3, #ARGV do
  local col = ARGV[i]
  local value = redis.call('HGET', KEYS[1], col)
  if value then
    local members = ARGV[1] .. '.index:' .. col .. ':' .. value
    removed = removed + redis.call('SREM', members, ARGV[2])
    if redis.call('SCARD', members) == 0 then
      redis.call('ZREM', ARGV[1] .. '.index:' .. col, value)
    end
  end
end
return removed";
