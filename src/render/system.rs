use crate::config::Config;

/// Detect the package manager and install Node.js, Apache, certbot,
/// the database server and PM2.
#[must_use]
pub fn render(config: &Config) -> String {
    super::script(
        &[
            ("NODE_VERSION", &config.node_version),
            ("SSH_USER", &config.user),
        ],
        BODY,
    )
}

const BODY: &str = r#"
set -o pipefail

echo "Detecting OS..."

if command -v dnf > /dev/null 2>&1; then
    echo "Detected RHEL/AlmaLinux/CentOS (dnf)"
    PKG_MGR="dnf"

    $PKG_MGR update -y
    $PKG_MGR upgrade -y
    $PKG_MGR groupinstall "Development Tools" -y || true
    $PKG_MGR install -y curl wget git gcc-c++ make

    echo "Installing Node.js ${NODE_VERSION}.x..."
    curl -fsSL "https://rpm.nodesource.com/setup_${NODE_VERSION}.x" | bash -
    $PKG_MGR install -y nodejs

    echo "Installing Apache (httpd)..."
    $PKG_MGR install -y httpd mod_ssl

    if ! grep -q "LoadModule proxy_module" /etc/httpd/conf.modules.d/00-proxy.conf 2>/dev/null; then
        cat > /etc/httpd/conf.modules.d/00-proxy.conf << 'PROXYEOF'
LoadModule proxy_module modules/mod_proxy.so
LoadModule proxy_http_module modules/mod_proxy_http.so
LoadModule proxy_wstunnel_module modules/mod_proxy_wstunnel.so
LoadModule rewrite_module modules/mod_rewrite.so
LoadModule headers_module modules/mod_headers.so
PROXYEOF
    fi

    echo "Installing certbot..."
    $PKG_MGR install -y epel-release
    $PKG_MGR install -y certbot python3-certbot-apache

    if command -v firewall-cmd > /dev/null 2>&1; then
        firewall-cmd --permanent --add-service=http 2>/dev/null || true
        firewall-cmd --permanent --add-service=https 2>/dev/null || true
        firewall-cmd --reload 2>/dev/null || true
        echo "Firewall configured (firewalld)"
    fi

    if command -v setsebool > /dev/null 2>&1; then
        setsebool -P httpd_can_network_connect 1 2>/dev/null || true
        setsebool -P httpd_can_network_relay 1 2>/dev/null || true
        echo "SELinux configured for proxy"
    fi

    systemctl enable httpd
    systemctl start httpd || true

elif command -v apt-get > /dev/null 2>&1; then
    echo "Detected Ubuntu/Debian (apt)"
    PKG_MGR="apt-get"
    export DEBIAN_FRONTEND=noninteractive

    $PKG_MGR update -y
    $PKG_MGR install -y curl wget git build-essential

    echo "Installing Node.js ${NODE_VERSION}.x..."
    curl -fsSL "https://deb.nodesource.com/setup_${NODE_VERSION}.x" | bash -
    $PKG_MGR install -y nodejs

    echo "Installing Apache..."
    $PKG_MGR install -y apache2
    a2enmod proxy proxy_http proxy_wstunnel ssl rewrite headers

    echo "Installing certbot..."
    $PKG_MGR install -y certbot python3-certbot-apache

    systemctl enable apache2
    systemctl start apache2 || true

else
    echo "Unsupported OS: neither dnf nor apt-get found"
    exit 1
fi

echo "Installing database server..."
if [ "$PKG_MGR" = "dnf" ]; then
    $PKG_MGR install -y mariadb-server mariadb
    systemctl enable mariadb
    systemctl start mariadb || true
    echo "MariaDB installed"
else
    $PKG_MGR install -y mysql-server
    systemctl enable mysql
    systemctl start mysql || true
    echo "MySQL installed"
fi

echo "Installing PM2..."
npm install -g pm2

USER_HOME=$(getent passwd "$SSH_USER" | cut -d: -f6)
pm2 startup systemd -u "$SSH_USER" --hp "${USER_HOME:-/home/$SSH_USER}" || true

echo "Verifying installations..."
node -v
npm -v
pm2 -v
apache2 -v 2>/dev/null || httpd -v
mysql --version 2>/dev/null || mariadb --version 2>/dev/null || echo "Database not installed"

echo "System setup complete"
"#;
